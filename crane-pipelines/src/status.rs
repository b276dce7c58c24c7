//! Derived result of a PipelineRun.

use crate::crd::PipelineRun;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Condition type Tekton uses to report run outcome.
const SUCCEEDED_CONDITION: &str = "Succeeded";

/// Condition reasons that mean the run was cancelled rather than failed.
const CANCELLED_REASONS: &[&str] = &[
    "PipelineRunCancelled",
    "Cancelled",
    "StoppedRunFinally",
    "CancelledRunFinally",
];

/// Condition reasons that mean the run has not started executing.
const PENDING_REASONS: &[&str] = &["Pending", "PipelineRunPending"];

/// Outcome of a PipelineRun as shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunResult {
    /// Finished successfully.
    Succeeded,
    /// Finished with a failure.
    Failed,
    /// Executing.
    Running,
    /// Created but not executing yet (held or waiting to be scheduled).
    Pending,
    /// Stopped by a user.
    Cancelled,
    /// Status cannot be interpreted.
    Unknown,
}

impl RunResult {
    /// Derive the result from a run's spec and reported status.
    pub fn of(run: &PipelineRun) -> Self {
        if run.spec.is_pending() {
            return Self::Pending;
        }

        let Some(status) = run.status.as_ref() else {
            return Self::Pending;
        };

        let succeeded = status
            .conditions
            .iter()
            .find(|c| c.condition_type == SUCCEEDED_CONDITION);

        let Some(condition) = succeeded else {
            return if status.start_time.is_some() {
                Self::Running
            } else {
                Self::Pending
            };
        };

        let reason = condition.reason.as_deref().unwrap_or_default();
        match condition.status.as_str() {
            "True" => Self::Succeeded,
            "False" if CANCELLED_REASONS.contains(&reason) => Self::Cancelled,
            "False" => Self::Failed,
            "Unknown" if PENDING_REASONS.contains(&reason) => Self::Pending,
            "Unknown" => Self::Running,
            _ => Self::Unknown,
        }
    }

    /// Display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Running => "Running",
            Self::Pending => "Pending",
            Self::Cancelled => "Cancelled",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "running" => Ok(Self::Running),
            "pending" => Ok(Self::Pending),
            "cancelled" => Ok(Self::Cancelled),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

/// Time the run started executing, if it has.
pub fn started_at(run: &PipelineRun) -> Option<DateTime<Utc>> {
    let start = run.status.as_ref()?.start_time.as_deref()?;
    DateTime::parse_from_rfc3339(start)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

/// Whether the cluster has reported any progress for the run.
pub fn has_reported_status(run: &PipelineRun) -> bool {
    run.status
        .as_ref()
        .is_some_and(|s| s.start_time.is_some() || !s.conditions.is_empty())
}
