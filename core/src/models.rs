use std::collections::BTreeMap;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const USERS_COLLECTION: &str = "users";
pub const GOALS_COLLECTION: &str = "goals";
pub const GOALS_DOC_ID: &str = "main";
pub const FOODS_COLLECTION: &str = "foods";
pub const CREATED_AT_FIELD: &str = "createdAt";

pub type Fields = BTreeMap<String, Value>;

/// A single field value inside a document.
///
/// Mirrors the value kinds a Firestore document can hold. `ServerTimestamp`
/// is only valid in writes; stores replace it with their commit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Bytes(String),
    Reference(String),
    GeoPoint { latitude: f64, longitude: f64 },
    Array(Vec<Value>),
    Map(Fields),
    ServerTimestamp,
}

impl Value {
    /// JavaScript truthiness, as used by the legacy completeness check.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Double(d) => *d != 0.0 && !d.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            #[allow(clippy::float_cmp)]
            Value::Double(d) if d.fract() == 0.0 => Some(*d as i64),
            _ => None,
        }
    }

    /// Plain JSON rendering for display and `--json` output.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => json!(b),
            Value::Integer(i) => json!(i),
            Value::Double(d) => json!(d),
            Value::String(s) | Value::Bytes(s) | Value::Reference(s) => json!(s),
            Value::Timestamp(ts) => json!(ts.to_rfc3339()),
            Value::GeoPoint {
                latitude,
                longitude,
            } => json!({ "latitude": latitude, "longitude": longitude }),
            Value::Array(values) => values.iter().map(Value::to_json).collect(),
            Value::Map(fields) => fields_to_json(fields),
            Value::ServerTimestamp => json!("<server timestamp>"),
        }
    }
}

#[must_use]
pub fn fields_to_json(fields: &Fields) -> serde_json::Value {
    serde_json::Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub path: String,
    pub fields: Fields,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
}

// --- Paths ---

/// Document ids follow Firestore's rules: non-empty, no `/`, not `.` or `..`.
pub fn validate_document_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("Document id must not be empty");
    }
    if id.contains('/') {
        bail!("Document id must not contain '/': {id}");
    }
    if id == "." || id == ".." {
        bail!("Document id must not be '.' or '..'");
    }
    Ok(())
}

pub fn validate_user_id(user_id: &str) -> Result<()> {
    validate_document_id(user_id.trim())
        .map_err(|e| anyhow::anyhow!("Invalid user id '{user_id}': {e}"))?;
    if user_id.trim() != user_id {
        bail!("Invalid user id '{user_id}': leading or trailing whitespace");
    }
    Ok(())
}

#[must_use]
pub fn user_path(user_id: &str) -> String {
    format!("{USERS_COLLECTION}/{user_id}")
}

#[must_use]
pub fn user_goals_path(user_id: &str) -> String {
    format!("{USERS_COLLECTION}/{user_id}/{GOALS_COLLECTION}/{GOALS_DOC_ID}")
}

/// Split a document path into its parent collection path and document id.
pub fn split_document_path(path: &str) -> Result<(&str, &str)> {
    let segments = path.split('/').count();
    if segments < 2 || segments % 2 != 0 {
        bail!("Not a document path: '{path}'");
    }
    let (collection, id) = path.rsplit_once('/').unwrap_or(("", path));
    validate_document_id(id)?;
    if collection.split('/').any(str::is_empty) {
        bail!("Not a document path: '{path}'");
    }
    Ok((collection, id))
}

// --- Goals ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GoalField {
    #[serde(rename = "calorieGoal")]
    Calorie,
    #[serde(rename = "waterGoal")]
    Water,
    #[serde(rename = "sleepGoal")]
    Sleep,
    #[serde(rename = "carbGoal")]
    Carb,
    #[serde(rename = "proteinGoal")]
    Protein,
    #[serde(rename = "fatGoal")]
    Fat,
}

impl GoalField {
    pub const ALL: [GoalField; 6] = [
        GoalField::Calorie,
        GoalField::Water,
        GoalField::Sleep,
        GoalField::Carb,
        GoalField::Protein,
        GoalField::Fat,
    ];

    pub const MACROS: [GoalField; 3] = [GoalField::Carb, GoalField::Protein, GoalField::Fat];

    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            GoalField::Calorie => "calorieGoal",
            GoalField::Water => "waterGoal",
            GoalField::Sleep => "sleepGoal",
            GoalField::Carb => "carbGoal",
            GoalField::Protein => "proteinGoal",
            GoalField::Fat => "fatGoal",
        }
    }

    #[must_use]
    pub fn default_value(self) -> i64 {
        match self {
            GoalField::Calorie => 2500,
            GoalField::Water => 2000,
            GoalField::Sleep => 8,
            GoalField::Carb => 50,
            GoalField::Protein => 30,
            GoalField::Fat => 20,
        }
    }

    #[must_use]
    pub fn unit(self) -> &'static str {
        match self {
            GoalField::Calorie => "kcal",
            GoalField::Water => "ml",
            GoalField::Sleep => "h",
            GoalField::Carb | GoalField::Protein | GoalField::Fat => "g",
        }
    }
}

/// The full set of fields written when a user has no goal record yet.
#[must_use]
pub fn default_goal_fields() -> Fields {
    let mut fields: Fields = GoalField::ALL
        .iter()
        .map(|f| (f.key().to_string(), Value::Integer(f.default_value())))
        .collect();
    fields.insert(CREATED_AT_FIELD.to_string(), Value::ServerTimestamp);
    fields
}

/// Typed view over a stored goal document. Absent or non-integer fields are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoalRecord {
    pub calorie_goal: Option<i64>,
    pub water_goal: Option<i64>,
    pub sleep_goal: Option<i64>,
    pub carb_goal: Option<i64>,
    pub protein_goal: Option<i64>,
    pub fat_goal: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl GoalRecord {
    #[must_use]
    pub fn from_fields(fields: &Fields) -> Self {
        let int = |f: GoalField| fields.get(f.key()).and_then(Value::as_integer);
        let created_at = match fields.get(CREATED_AT_FIELD) {
            Some(Value::Timestamp(ts)) => Some(*ts),
            _ => None,
        };
        Self {
            calorie_goal: int(GoalField::Calorie),
            water_goal: int(GoalField::Water),
            sleep_goal: int(GoalField::Sleep),
            carb_goal: int(GoalField::Carb),
            protein_goal: int(GoalField::Protein),
            fat_goal: int(GoalField::Fat),
            created_at,
        }
    }

    #[must_use]
    pub fn get(&self, field: GoalField) -> Option<i64> {
        match field {
            GoalField::Calorie => self.calorie_goal,
            GoalField::Water => self.water_goal,
            GoalField::Sleep => self.sleep_goal,
            GoalField::Carb => self.carb_goal,
            GoalField::Protein => self.protein_goal,
            GoalField::Fat => self.fat_goal,
        }
    }
}
