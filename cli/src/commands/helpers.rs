use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use goalseed_core::models::{CREATED_AT_FIELD, Fields, GoalField, GoalRecord, Value};
use goalseed_core::reconcile::{Outcome, UserOutcome};

pub(crate) fn print_outcome_table(outcomes: &[UserOutcome]) {
    #[derive(Tabled)]
    struct OutcomeRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "User")]
        user: String,
        #[tabled(rename = "Outcome")]
        outcome: String,
        #[tabled(rename = "Filled")]
        filled: String,
    }

    let rows: Vec<OutcomeRow> = outcomes
        .iter()
        .enumerate()
        .map(|(i, o)| OutcomeRow {
            idx: i + 1,
            user: truncate(&o.user_id, 32),
            outcome: o.outcome.label().to_string(),
            filled: match &o.outcome {
                Outcome::Created => "all".to_string(),
                Outcome::Updated { filled } => filled
                    .iter()
                    .map(|f| f.key())
                    .collect::<Vec<_>>()
                    .join(", "),
                Outcome::Unchanged => "-".to_string(),
            },
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn print_goal_table(record: &GoalRecord) {
    #[derive(Tabled)]
    struct GoalRow {
        #[tabled(rename = "Goal")]
        goal: &'static str,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Unit")]
        unit: &'static str,
        #[tabled(rename = "Default")]
        default: i64,
    }

    let rows: Vec<GoalRow> = GoalField::ALL
        .iter()
        .map(|&f| GoalRow {
            goal: f.key(),
            value: record.get(f).map_or("-".into(), |v| v.to_string()),
            unit: f.unit(),
            default: f.default_value(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..2)).with(Alignment::right()))
        .with(Modify::new(Columns::new(3..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

/// Fields not covered by the goal table, e.g. ones the app added later.
pub(crate) fn extra_fields(fields: &Fields) -> Vec<(&str, String)> {
    fields
        .iter()
        .filter(|(k, _)| {
            k.as_str() != CREATED_AT_FIELD && !GoalField::ALL.iter().any(|f| f.key() == k.as_str())
        })
        .map(|(k, v)| (k.as_str(), display_value(v)))
        .collect()
}

pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        other => other.to_json().to_string(),
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
