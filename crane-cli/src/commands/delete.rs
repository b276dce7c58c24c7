//! Delete commands - remove an import or a single run.

use super::{Context, find_group};
use anyhow::{Context as _, Result};
use crane_pipelines::ops::{delete_pipeline_group, delete_pipeline_run};

/// Delete a whole import.
///
/// Returns once the import is gone from the watched groups.
pub async fn group(ctx: &Context, name: &str) -> Result<()> {
    let (watch, watched) = ctx.load_groups().await?;
    let group = find_group(&watched, name, &ctx.namespace)?;
    let group_name = group.name.clone();

    delete_pipeline_group(&ctx.api(), group)
        .await
        .context(format!("Failed to delete import '{}'", name))?;

    watch
        .wait_until(|watched| watched.find(&group_name).is_none(), ctx.timeout)
        .await
        .context("Delete was accepted but the import is still listed")?;

    println!("Deleted import {}", name);
    Ok(())
}

/// Delete one run.
pub async fn run(ctx: &Context, name: &str) -> Result<()> {
    let (watch, _) = ctx.load_groups().await?;

    delete_pipeline_run(&ctx.api(), name)
        .await
        .context(format!("Failed to delete PipelineRun '{}'", name))?;

    watch
        .wait_until(
            |watched| {
                watched
                    .groups
                    .iter()
                    .flat_map(|g| g.runs(None))
                    .all(|run| run.metadata.name.as_deref() != Some(name))
            },
            ctx.timeout,
        )
        .await
        .context("Delete was accepted but the run is still listed")?;

    println!("Deleted PipelineRun {}", name);
    Ok(())
}
