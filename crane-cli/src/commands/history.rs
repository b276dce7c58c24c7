//! History command - show the runs of one import.

use super::{Context, find_group};
use anyhow::Result;

/// Run the history command.
pub async fn run(ctx: &Context, name: &str) -> Result<()> {
    let (_watch, watched) = ctx.load_groups().await?;
    let group = find_group(&watched, name, &ctx.namespace)?;
    let history = group.history();

    println!("Import: {}", group.import_name());
    println!();

    if history.is_empty() {
        println!("No runs have been started yet");
        return Ok(());
    }

    println!("{:<40} {:<8} {:<26} {:<10}", "RUN", "ACTION", "STARTED", "RESULT");
    for row in history {
        println!(
            "{:<40} {:<8} {:<26} {:<10}",
            row.name,
            row.action.map(|a| a.label()).unwrap_or("-"),
            row.started
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "-".into()),
            row.result,
        );
    }

    Ok(())
}
