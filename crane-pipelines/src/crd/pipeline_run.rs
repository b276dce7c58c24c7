//! Tekton `PipelineRun` resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `spec.status` value of a run that has been created but not released to execute.
pub const PIPELINE_RUN_PENDING: &str = "PipelineRunPending";

/// A Tekton PipelineRun: one execution of a Pipeline.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "tekton.dev",
    version = "v1beta1",
    kind = "PipelineRun",
    plural = "pipelineruns",
    namespaced,
    status = "PipelineRunStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunSpec {
    /// Pipeline this run executes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_ref: Option<PipelineRef>,

    /// Run-level status request. `PipelineRunPending` holds the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Fields crane does not interpret (params, workspaces, timeouts, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PipelineRunSpec {
    /// Whether the run is held in the pending state.
    pub fn is_pending(&self) -> bool {
        self.status.as_deref() == Some(PIPELINE_RUN_PENDING)
    }
}

/// Reference to the executed pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRef {
    /// Pipeline name.
    pub name: String,
}

/// Observed state of a PipelineRun.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunStatus {
    /// RFC 3339 time the run started executing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    /// RFC 3339 time the run finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,

    /// Knative-style conditions; Tekton reports a single `Succeeded` condition.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<RunCondition>,

    /// Remaining status fields (child references, results, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Condition reported on a PipelineRun.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunCondition {
    /// Condition type, normally `Succeeded`.
    #[serde(rename = "type")]
    pub condition_type: String,

    /// `True`, `False` or `Unknown`.
    pub status: String,

    /// Machine-readable reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}
