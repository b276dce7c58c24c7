//! List command - list imports in the namespace.

use super::{Context, group_state};
use anyhow::Result;
use crane_pipelines::classify::latest_non_pending_run;
use crane_pipelines::{CraneAnnotations, RunResult};
use kube::ResourceExt;

/// Run the list command.
pub async fn run(ctx: &Context) -> Result<()> {
    let (watch, watched) = ctx.load_groups().await?;
    watch.stop();

    tracing::info!(
        namespace = %ctx.namespace,
        groups = watched.groups.len(),
        "Listing imports"
    );

    if watched.groups.is_empty() {
        println!("No imports in namespace '{}'", ctx.namespace);
        return Ok(());
    }

    println!(
        "{:<28} {:<8} {:<5} {:<36} {:<18} {:<8}",
        "NAME", "STAGE", "PVCS", "LAST RUN", "RESULT", "STATE"
    );
    for group in &watched.groups {
        let last = latest_non_pending_run(group, None);
        let last_name = last.map(|run| run.name_any()).unwrap_or_else(|| "-".into());
        let last_result = last
            .map(|run| {
                let action = CraneAnnotations::from_meta(&run.metadata)
                    .action
                    .map(|a| a.label())
                    .unwrap_or("?");
                format!("{} {}", action, RunResult::of(run))
            })
            .unwrap_or_else(|| "-".into());

        println!(
            "{:<28} {:<8} {:<5} {:<36} {:<18} {:<8}",
            group.import_name(),
            if group.pipelines.stage.is_some() { "yes" } else { "no" },
            group.pvc_count(),
            last_name,
            last_result,
            group_state(group),
        );
    }

    Ok(())
}
