use anyhow::Result;
use tracing::info;

use goalseed_core::models::{CREATED_AT_FIELD, Fields, Value, user_path, validate_user_id};
use goalseed_core::store::{DocumentStore, SetMode};

/// Register a user document so the next `seed` run picks it up.
pub(crate) async fn cmd_add_user(store: &dyn DocumentStore, user_id: &str, json: bool) -> Result<()> {
    validate_user_id(user_id)?;
    let path = user_path(user_id);

    let created = if store.get_document(&path).await?.is_some() {
        false
    } else {
        let fields = Fields::from([(CREATED_AT_FIELD.to_string(), Value::ServerTimestamp)]);
        store.set_document(&path, &fields, SetMode::Merge).await?;
        info!(user = user_id, "added user");
        true
    };

    if json {
        println!(
            "{}",
            serde_json::json!({ "user_id": user_id, "path": path, "created": created })
        );
    } else if created {
        println!("Added user '{user_id}'.");
    } else {
        println!("User '{user_id}' already exists.");
    }

    Ok(())
}
