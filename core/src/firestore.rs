//! Firestore REST (v1) wire types and conversions to and from [`Value`].
//!
//! Only the pieces this tool talks to are modelled: typed values, documents,
//! `ListDocuments` responses and single-write `Commit` requests.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Document, Fields, Value};
use crate::store::SetMode;

pub const REQUEST_TIME: &str = "REQUEST_TIME";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WireValue {
    NullValue(Option<String>),
    BooleanValue(bool),
    IntegerValue(String),
    DoubleValue(WireDouble),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(LatLng),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

/// Doubles arrive as JSON numbers, except `NaN` and the infinities which are strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireDouble {
    Number(f64),
    Special(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<WireValue>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, WireValue>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDocument {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, WireValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsResponse {
    #[serde(default)]
    pub documents: Vec<WireDocument>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommitRequest {
    pub writes: Vec<Write>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Write {
    pub update: WireDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<DocumentMask>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub update_transforms: Vec<FieldTransform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_document: Option<Precondition>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMask {
    pub field_paths: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTransform {
    pub field_path: String,
    pub set_to_server_value: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Precondition {
    pub exists: bool,
}

/// Resource name of a Firestore database, e.g.
/// `projects/my-app/databases/(default)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseName {
    pub project_id: String,
    pub database_id: String,
}

impl DatabaseName {
    #[must_use]
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            database_id: "(default)".to_string(),
        }
    }

    #[must_use]
    pub fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database_id
        )
    }

    #[must_use]
    pub fn document_name(&self, path: &str) -> String {
        format!("{}/{path}", self.documents_root())
    }

    /// Strip the database prefix off a full document name.
    pub fn relative_path<'a>(&self, name: &'a str) -> Result<&'a str> {
        let root = self.documents_root();
        name.strip_prefix(root.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .with_context(|| format!("Document name outside database {root}: {name}"))
    }
}

/// Field paths that are not plain identifiers must be backtick-quoted.
#[must_use]
pub fn quote_field_path(key: &str) -> String {
    let simple = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        key.to_string()
    } else {
        format!("`{}`", key.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn encode_value(value: &Value) -> Result<WireValue> {
    Ok(match value {
        Value::Null => WireValue::NullValue(Some("NULL_VALUE".to_string())),
        Value::Boolean(b) => WireValue::BooleanValue(*b),
        Value::Integer(i) => WireValue::IntegerValue(i.to_string()),
        Value::Double(d) if d.is_nan() => WireValue::DoubleValue(WireDouble::Special("NaN".into())),
        Value::Double(d) if d.is_infinite() => {
            let s = if d.is_sign_positive() { "Infinity" } else { "-Infinity" };
            WireValue::DoubleValue(WireDouble::Special(s.into()))
        }
        Value::Double(d) => WireValue::DoubleValue(WireDouble::Number(*d)),
        Value::String(s) => WireValue::StringValue(s.clone()),
        Value::Timestamp(ts) => WireValue::TimestampValue(format_timestamp(ts)),
        Value::Bytes(b) => WireValue::BytesValue(b.clone()),
        Value::Reference(r) => WireValue::ReferenceValue(r.clone()),
        Value::GeoPoint {
            latitude,
            longitude,
        } => WireValue::GeoPointValue(LatLng {
            latitude: *latitude,
            longitude: *longitude,
        }),
        Value::Array(items) => WireValue::ArrayValue(ArrayValue {
            values: items.iter().map(encode_value).collect::<Result<_>>()?,
        }),
        Value::Map(fields) => WireValue::MapValue(MapValue {
            fields: fields
                .iter()
                .map(|(k, v)| Ok((k.clone(), encode_value(v)?)))
                .collect::<Result<_>>()?,
        }),
        Value::ServerTimestamp => bail!("Server timestamps are only supported as top-level fields"),
    })
}

pub fn decode_value(value: WireValue) -> Result<Value> {
    Ok(match value {
        WireValue::NullValue(_) => Value::Null,
        WireValue::BooleanValue(b) => Value::Boolean(b),
        WireValue::IntegerValue(s) => Value::Integer(
            s.parse()
                .with_context(|| format!("Invalid integerValue: {s}"))?,
        ),
        WireValue::DoubleValue(WireDouble::Number(d)) => Value::Double(d),
        WireValue::DoubleValue(WireDouble::Special(s)) => Value::Double(match s.as_str() {
            "NaN" => f64::NAN,
            "Infinity" => f64::INFINITY,
            "-Infinity" => f64::NEG_INFINITY,
            other => bail!("Invalid doubleValue: {other}"),
        }),
        WireValue::TimestampValue(s) => Value::Timestamp(
            DateTime::parse_from_rfc3339(&s)
                .with_context(|| format!("Invalid timestampValue: {s}"))?
                .with_timezone(&Utc),
        ),
        WireValue::StringValue(s) => Value::String(s),
        WireValue::BytesValue(b) => Value::Bytes(b),
        WireValue::ReferenceValue(r) => Value::Reference(r),
        WireValue::GeoPointValue(p) => Value::GeoPoint {
            latitude: p.latitude,
            longitude: p.longitude,
        },
        WireValue::ArrayValue(a) => Value::Array(
            a.values
                .into_iter()
                .map(decode_value)
                .collect::<Result<_>>()?,
        ),
        WireValue::MapValue(m) => Value::Map(decode_fields(m.fields)?),
    })
}

pub fn decode_fields(fields: BTreeMap<String, WireValue>) -> Result<Fields> {
    fields
        .into_iter()
        .map(|(k, v)| {
            let value = decode_value(v).with_context(|| format!("Field '{k}'"))?;
            Ok((k, value))
        })
        .collect()
}

pub fn decode_document(db: &DatabaseName, doc: WireDocument) -> Result<Document> {
    let path = db.relative_path(&doc.name)?.to_string();
    let id = path.rsplit('/').next().unwrap_or_default().to_string();
    let parse_time = |t: Option<String>| -> Result<Option<DateTime<Utc>>> {
        t.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|ts| ts.with_timezone(&Utc))
                .with_context(|| format!("Invalid document time: {s}"))
        })
        .transpose()
    };
    Ok(Document {
        id,
        path,
        fields: decode_fields(doc.fields).with_context(|| format!("Document {}", doc.name))?,
        create_time: parse_time(doc.create_time)?,
        update_time: parse_time(doc.update_time)?,
    })
}

/// Build the single write that `set_document` commits.
///
/// Server timestamps become `REQUEST_TIME` transforms. A merge write always
/// carries an update mask, even an empty one, so fields outside it survive.
pub fn build_set_write(document_name: &str, fields: &Fields, mode: SetMode) -> Result<Write> {
    let mut wire_fields = BTreeMap::new();
    let mut transforms = Vec::new();

    for (key, value) in fields {
        if matches!(value, Value::ServerTimestamp) {
            transforms.push(FieldTransform {
                field_path: quote_field_path(key),
                set_to_server_value: REQUEST_TIME,
            });
        } else {
            let encoded = encode_value(value).with_context(|| format!("Field '{key}'"))?;
            wire_fields.insert(key.clone(), encoded);
        }
    }

    let update_mask = match mode {
        SetMode::Overwrite => None,
        SetMode::Merge => Some(DocumentMask {
            field_paths: wire_fields.keys().map(|k| quote_field_path(k)).collect(),
        }),
    };

    Ok(Write {
        update: WireDocument {
            name: document_name.to_string(),
            fields: wire_fields,
            create_time: None,
            update_time: None,
        },
        update_mask,
        update_transforms: transforms,
        current_document: None,
    })
}

/// Like an overwrite, but fails if the document already exists.
pub fn build_create_write(document_name: &str, fields: &Fields) -> Result<Write> {
    let mut write = build_set_write(document_name, fields, SetMode::Overwrite)?;
    write.current_document = Some(Precondition { exists: false });
    Ok(write)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::default_goal_fields;

    fn db() -> DatabaseName {
        DatabaseName::new("demo-app")
    }

    #[test]
    fn test_document_names() {
        let db = db();
        assert_eq!(
            db.document_name("users/u1/goals/main"),
            "projects/demo-app/databases/(default)/documents/users/u1/goals/main"
        );
        assert_eq!(
            db.relative_path("projects/demo-app/databases/(default)/documents/users/u1")
                .unwrap(),
            "users/u1"
        );
        assert!(db.relative_path("projects/other/databases/(default)/documents/users/u1").is_err());
    }

    #[test]
    fn test_decode_list_response() {
        let body = json!({
            "documents": [{
                "name": "projects/demo-app/databases/(default)/documents/users/u1/goals/main",
                "fields": {
                    "calorieGoal": { "integerValue": "1800" },
                    "carbGoal": { "doubleValue": 0 },
                    "note": { "nullValue": null },
                    "createdAt": { "timestampValue": "2024-06-15T10:00:00.123456Z" },
                    "tags": { "arrayValue": {} },
                    "meta": { "mapValue": { "fields": { "ok": { "booleanValue": true } } } }
                },
                "createTime": "2024-06-15T10:00:00.123456Z",
                "updateTime": "2024-06-15T10:00:00.123456Z"
            }],
            "nextPageToken": "abc"
        });

        let resp: ListDocumentsResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.next_page_token.as_deref(), Some("abc"));

        let doc = decode_document(&db(), resp.documents.into_iter().next().unwrap()).unwrap();
        assert_eq!(doc.id, "main");
        assert_eq!(doc.path, "users/u1/goals/main");
        assert_eq!(doc.fields["calorieGoal"], Value::Integer(1800));
        assert_eq!(doc.fields["carbGoal"], Value::Double(0.0));
        assert_eq!(doc.fields["note"], Value::Null);
        assert_eq!(doc.fields["tags"], Value::Array(vec![]));
        assert!(matches!(doc.fields["createdAt"], Value::Timestamp(_)));
        assert!(matches!(&doc.fields["meta"], Value::Map(m) if m["ok"] == Value::Boolean(true)));
        assert!(doc.create_time.is_some());
    }

    #[test]
    fn test_decode_empty_list_response() {
        let resp: ListDocumentsResponse = serde_json::from_value(json!({})).unwrap();
        assert!(resp.documents.is_empty());
        assert!(resp.next_page_token.is_none());
    }

    #[test]
    fn test_decode_special_doubles() {
        let v: WireValue = serde_json::from_value(json!({ "doubleValue": "NaN" })).unwrap();
        assert!(matches!(decode_value(v).unwrap(), Value::Double(d) if d.is_nan()));

        let v: WireValue = serde_json::from_value(json!({ "doubleValue": "-Infinity" })).unwrap();
        assert_eq!(decode_value(v).unwrap(), Value::Double(f64::NEG_INFINITY));
    }

    #[test]
    fn test_decode_bad_integer() {
        let v = WireValue::IntegerValue("twelve".to_string());
        assert!(decode_value(v).is_err());
    }

    #[test]
    fn test_overwrite_write_for_default_goals() {
        let write = build_set_write(
            &db().document_name("users/u1/goals/main"),
            &default_goal_fields(),
            SetMode::Overwrite,
        )
        .unwrap();
        let body = serde_json::to_value(CommitRequest {
            writes: vec![write],
        })
        .unwrap();

        let w = &body["writes"][0];
        assert_eq!(
            w["update"]["name"],
            "projects/demo-app/databases/(default)/documents/users/u1/goals/main"
        );
        assert_eq!(w["update"]["fields"]["calorieGoal"], json!({ "integerValue": "2500" }));
        assert_eq!(w["update"]["fields"]["fatGoal"], json!({ "integerValue": "20" }));
        assert!(w["update"]["fields"].get("createdAt").is_none());
        assert!(w.get("updateMask").is_none());
        assert_eq!(
            w["updateTransforms"],
            json!([{ "fieldPath": "createdAt", "setToServerValue": "REQUEST_TIME" }])
        );
        assert!(w.get("currentDocument").is_none());
    }

    #[test]
    fn test_merge_write_has_mask() {
        let mut fields = Fields::new();
        fields.insert("carbGoal".to_string(), Value::Integer(50));
        fields.insert("fatGoal".to_string(), Value::Integer(20));

        let write = build_set_write("x", &fields, SetMode::Merge).unwrap();
        let w = serde_json::to_value(&write).unwrap();
        assert_eq!(w["updateMask"], json!({ "fieldPaths": ["carbGoal", "fatGoal"] }));
        assert!(w.get("updateTransforms").is_none());
    }

    #[test]
    fn test_merge_with_only_transform_keeps_empty_mask() {
        let mut fields = Fields::new();
        fields.insert("createdAt".to_string(), Value::ServerTimestamp);

        let write = build_set_write("x", &fields, SetMode::Merge).unwrap();
        let w = serde_json::to_value(&write).unwrap();
        assert_eq!(w["updateMask"], json!({ "fieldPaths": [] }));
        assert_eq!(w["updateTransforms"][0]["fieldPath"], "createdAt");
    }

    #[test]
    fn test_create_write_has_precondition() {
        let write = build_create_write("x", &Fields::new()).unwrap();
        let w = serde_json::to_value(&write).unwrap();
        assert_eq!(w["currentDocument"], json!({ "exists": false }));
    }

    #[test]
    fn test_nested_server_timestamp_rejected() {
        let mut inner = Fields::new();
        inner.insert("at".to_string(), Value::ServerTimestamp);
        let mut fields = Fields::new();
        fields.insert("meta".to_string(), Value::Map(inner));
        assert!(build_set_write("x", &fields, SetMode::Overwrite).is_err());
    }

    #[test]
    fn test_quote_field_path() {
        assert_eq!(quote_field_path("carbGoal"), "carbGoal");
        assert_eq!(quote_field_path("_x1"), "_x1");
        assert_eq!(quote_field_path("Energy (kcal)"), "`Energy (kcal)`");
        assert_eq!(quote_field_path("1st"), "`1st`");
        assert_eq!(quote_field_path("a`b"), "`a\\`b`");
    }

    #[test]
    fn test_encode_decode_timestamp() {
        let ts = DateTime::parse_from_rfc3339("2024-06-15T10:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);
        let wire = encode_value(&Value::Timestamp(ts)).unwrap();
        assert_eq!(wire, WireValue::TimestampValue("2024-06-15T10:00:00.500Z".to_string()));
        assert_eq!(decode_value(wire).unwrap(), Value::Timestamp(ts));
    }
}
