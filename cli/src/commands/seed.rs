use anyhow::Result;

use goalseed_core::reconcile::{GoalReconciler, ReconcileOptions};
use goalseed_core::store::DocumentStore;

use super::helpers::print_outcome_table;

pub(crate) async fn cmd_seed(
    store: &dyn DocumentStore,
    options: ReconcileOptions,
    json: bool,
) -> Result<()> {
    let report = GoalReconciler::new(store, options).run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.users_seen == 0 {
        println!("No users found.");
        return Ok(());
    }

    print_outcome_table(&report.outcomes);

    if report.dry_run {
        println!("\nDry run, no changes made.\n");
        println!("  Users seen:      {}", report.users_seen);
        println!("  Goals to create: {}", report.created);
        println!("  Goals to update: {}", report.updated);
    } else {
        println!("\nGoals seeded.\n");
        println!("  Users seen:    {}", report.users_seen);
        println!("  Goals created: {}", report.created);
        println!("  Goals updated: {}", report.updated);
    }
    println!("  Unchanged:     {}", report.unchanged);
    println!("  Check:         {}", report.check.label());

    Ok(())
}
