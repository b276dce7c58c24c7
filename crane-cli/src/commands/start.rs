//! Stage and cutover commands - start a run of an import.

use super::{Context, find_group};
use anyhow::{Context as _, Result};
use crane_pipelines::classify::{action_availability, is_pipeline_run_starting};
use crane_pipelines::ops::{StartedRun, start_pipeline_run};
use crane_pipelines::{CranePipelineAction, Mutation, MutationState, RunResult};

/// Run the stage or cutover command.
pub async fn run(ctx: &Context, name: &str, action: CranePipelineAction, wait: bool) -> Result<()> {
    let (watch, watched) = ctx.load_groups().await?;
    let group = find_group(&watched, name, &ctx.namespace)?.clone();

    let availability = action_availability(&group, action, &MutationState::Idle);
    if let Some(reason) = availability.disabled_reason {
        anyhow::bail!("Cannot start {} of '{}': {}", action, group.import_name(), reason);
    }

    let mutation = Mutation::<StartedRun>::new();
    let api = ctx.api();
    let target = group.clone();
    let started = mutation
        .run(async move { start_pipeline_run(&api, &target, action).await })
        .await
        .context(format!("Failed to start {} of '{}'", action, group.import_name()))?;

    if started.reused_pending {
        println!("Started {} run {}", action, started.name);
    } else {
        println!("Created {} run {}", action, started.name);
    }

    if !wait {
        return Ok(());
    }

    let state = mutation.state();
    let group_name = group.name.clone();
    let watched = watch
        .wait_until(
            |watched| {
                watched
                    .find(&group_name)
                    .is_some_and(|g| !is_pipeline_run_starting(g, action, &state))
            },
            ctx.timeout,
        )
        .await
        .context("Run was accepted but has not reported a status yet")?;

    let result = watched
        .find(&group_name)
        .and_then(|g| g.latest_run(action))
        .map(RunResult::of)
        .unwrap_or(RunResult::Unknown);
    println!("{} run {} is {}", action.label(), started.name, result);

    Ok(())
}
