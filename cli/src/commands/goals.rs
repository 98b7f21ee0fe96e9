use anyhow::Result;

use goalseed_core::models::{GoalRecord, fields_to_json, user_goals_path, validate_user_id};
use goalseed_core::store::DocumentStore;

use super::helpers::{extra_fields, print_goal_table};

pub(crate) async fn cmd_goals(store: &dyn DocumentStore, user_id: &str, json: bool) -> Result<()> {
    validate_user_id(user_id)?;

    let Some(doc) = store.get_document(&user_goals_path(user_id)).await? else {
        if json {
            println!("{}", serde_json::json!({ "user_id": user_id, "goals": null }));
        } else {
            println!("No goals record for user '{user_id}'. Run `goalseed seed` to create one.");
        }
        return Ok(());
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "user_id": user_id,
                "path": doc.path,
                "goals": fields_to_json(&doc.fields),
            }))?
        );
        return Ok(());
    }

    println!("Goals for {user_id} ({}):\n", doc.path);
    let record = GoalRecord::from_fields(&doc.fields);
    print_goal_table(&record);
    match record.created_at {
        Some(ts) => println!("\n  Created: {}", ts.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("\n  Created: -"),
    }

    let extra = extra_fields(&doc.fields);
    if !extra.is_empty() {
        println!();
        for (key, value) in extra {
            println!("  {key}: {value}");
        }
    }

    Ok(())
}
