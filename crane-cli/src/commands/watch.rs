//! Watch command - print imports whenever they change.

use super::{Context, group_state};
use anyhow::Result;
use crane_pipelines::classify::latest_non_pending_run;
use crane_pipelines::watch::PipelineGroupWatch;
use crane_pipelines::RunResult;

/// Run the watch command until interrupted.
pub async fn run(ctx: &Context) -> Result<()> {
    let watch = PipelineGroupWatch::new(ctx.client.clone());
    let mut changes = watch.subscribe();
    watch.start(&ctx.namespace);

    println!("Watching imports in namespace '{}' (Ctrl-C to stop)", ctx.namespace);

    let mut last_printed = None;
    loop {
        let watched = watch.groups();
        if let Some(error) = &watched.error {
            eprintln!("watch error: {}", error);
        }

        if watched.loaded {
            let summary: Vec<String> = watched
                .groups
                .iter()
                .map(|group| {
                    let last = latest_non_pending_run(group, None)
                        .map(|run| RunResult::of(run).to_string())
                        .unwrap_or_else(|| "-".into());
                    format!("{} [{}] last: {}", group.import_name(), group_state(group), last)
                })
                .collect();

            if last_printed.as_ref() != Some(&summary) {
                println!("---");
                for line in &summary {
                    println!("{}", line);
                }
                last_printed = Some(summary);
            }
        }

        tokio::select! {
            changed = changes.changed() => changed?,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    watch.stop();
    Ok(())
}
