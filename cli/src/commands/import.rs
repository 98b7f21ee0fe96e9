use std::path::Path;

use anyhow::{Context, Result};

use goalseed_core::cofid_import::{import_cofid_foods, parse_cofid_csv};
use goalseed_core::store::DocumentStore;

pub(crate) async fn cmd_import_cofid(
    store: &dyn DocumentStore,
    path: &Path,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let rows = parse_cofid_csv(file)?;

    if rows.is_empty() {
        if json {
            println!(
                "{}",
                serde_json::json!({ "error": "No foods found in CSV file" })
            );
        } else {
            eprintln!("No foods found in CSV file.");
        }
        return Ok(());
    }

    let summary = import_cofid_foods(store, &rows, dry_run).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if dry_run {
        println!("Dry run, no changes made.\n");
        println!("  Rows parsed:  {}", summary.rows_parsed);
        println!("  Foods to add: {}", summary.rows_parsed);
    } else {
        println!("Import complete.\n");
        println!("  Rows parsed: {}", summary.rows_parsed);
        println!("  Foods added: {}", summary.foods_added);
    }

    Ok(())
}
