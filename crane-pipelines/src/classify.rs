//! Run-state predicates over a pipeline group.
//!
//! These are pure functions of a [`CranePipelineGroup`] snapshot and, for
//! start-related checks, the state of the start mutation. They decide which
//! actions an operator may take on a group.

use crate::annotations::CranePipelineAction;
use crate::crd::PipelineRun;
use crate::group::CranePipelineGroup;
use crate::mutation::MutationState;
use crate::ops::StartedRun;
use crate::status::{RunResult, has_reported_status};
use kube::ResourceExt;
use std::fmt;

/// Most recent run that has been released to execute.
///
/// With `action` set only that action's runs are considered.
pub fn latest_non_pending_run(
    group: &CranePipelineGroup,
    action: Option<CranePipelineAction>,
) -> Option<&PipelineRun> {
    group
        .runs(action)
        .iter()
        .find(|run| !run.spec.is_pending())
}

/// Whether a start of `action` is in flight or has not yet shown up in the group.
///
/// After the start mutation succeeds the group keeps reporting "starting"
/// until the watch delivers the started run out of pending with a status,
/// so there is no idle gap between the API response and the next snapshot.
pub fn is_pipeline_run_starting(
    group: &CranePipelineGroup,
    action: CranePipelineAction,
    mutation: &MutationState<StartedRun>,
) -> bool {
    match mutation {
        MutationState::Loading => true,
        MutationState::Success(started) if started.action == action => {
            let observed = group
                .runs(Some(action))
                .iter()
                .find(|run| run.name_any() == started.name);
            match observed {
                Some(run) => run.spec.is_pending() || !has_reported_status(run),
                None => true,
            }
        }
        _ => false,
    }
}

/// Whether any run of the group is executing.
pub fn is_some_pipeline_running(group: &CranePipelineGroup) -> bool {
    group
        .runs(None)
        .iter()
        .any(|run| RunResult::of(run) == RunResult::Running)
}

/// Whether a run of `action` has the given result.
pub fn has_run_with_status(
    group: &CranePipelineGroup,
    action: CranePipelineAction,
    status: RunResult,
) -> bool {
    group
        .runs(Some(action))
        .iter()
        .any(|run| RunResult::of(run) == status)
}

/// Whether a pipeline of the group has lost all of its runs.
///
/// Imports pre-create a pending run for every pipeline, so a pipeline with no
/// runs means runs were deleted independently and the group is broken.
pub fn is_missing_pipeline_runs(group: &CranePipelineGroup) -> bool {
    let stage_missing =
        group.pipelines.stage.is_some() && group.pipeline_runs.stage.is_empty();
    let cutover_missing = group.pipeline_runs.cutover.is_empty();
    stage_missing || cutover_missing
}

/// Why an action cannot be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisabledReason {
    /// A start of this action is already in flight.
    Starting,
    /// Pre-generated runs were deleted.
    GroupBroken,
    /// A stage or cutover run is executing.
    AlreadyRunning,
    /// Stage is not allowed once a cutover is running or done.
    PastCutover,
    /// The group has no stage pipeline.
    NoStagePipeline,
}

impl fmt::Display for DisabledReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::Starting => "A PipelineRun for this action is already starting.",
            Self::GroupBroken => {
                "This application cannot be imported because pre-generated PipelineRuns have been deleted. Delete the import and start a new one."
            }
            Self::AlreadyRunning => {
                "A stage or cutover cannot be started while one is already running."
            }
            Self::PastCutover => {
                "A stage cannot be run after a cutover is already running or succeeded."
            }
            Self::NoStagePipeline => {
                "This import has no persistent volume claims, so there is no stage pipeline."
            }
        };
        f.write_str(message)
    }
}

/// Whether an action can be started, and how to present it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionAvailability {
    /// Action the availability describes.
    pub action: CranePipelineAction,
    /// A start is in flight or not yet visible.
    pub is_loading: bool,
    /// Reason the action is disabled, `None` when it can be started.
    pub disabled_reason: Option<DisabledReason>,
}

impl ActionAvailability {
    /// Whether the action cannot be started.
    pub fn is_disabled(&self) -> bool {
        self.disabled_reason.is_some()
    }
}

/// Combine the predicates into the enablement rule for one action.
pub fn action_availability(
    group: &CranePipelineGroup,
    action: CranePipelineAction,
    mutation: &MutationState<StartedRun>,
) -> ActionAvailability {
    let is_starting = is_pipeline_run_starting(group, action, mutation);
    let is_past_cutover = [RunResult::Running, RunResult::Succeeded]
        .into_iter()
        .any(|status| has_run_with_status(group, CranePipelineAction::Cutover, status));

    let disabled_reason = if action == CranePipelineAction::Stage
        && group.pipelines.stage.is_none()
    {
        Some(DisabledReason::NoStagePipeline)
    } else if is_missing_pipeline_runs(group) {
        Some(DisabledReason::GroupBroken)
    } else if is_starting {
        Some(DisabledReason::Starting)
    } else if is_some_pipeline_running(group) {
        Some(DisabledReason::AlreadyRunning)
    } else if action == CranePipelineAction::Stage && is_past_cutover {
        Some(DisabledReason::PastCutover)
    } else {
        None
    };

    ActionAvailability {
        action,
        is_loading: is_starting,
        disabled_reason,
    }
}
