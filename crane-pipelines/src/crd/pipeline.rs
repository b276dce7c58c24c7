//! Tekton `Pipeline` resource.
//!
//! Only the fields crane reads are typed. Everything else is carried in
//! flattened maps so an object fetched from the cluster can be cloned and
//! submitted again without losing data.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the Tekton task that copies one persistent volume claim.
pub const TRANSFER_PVC_TASK: &str = "crane-transfer-pvc";

/// A Tekton Pipeline: a named, ordered list of tasks.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "tekton.dev",
    version = "v1beta1",
    kind = "Pipeline",
    plural = "pipelines",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    /// Ordered tasks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<PipelineTask>,

    /// Fields crane does not interpret (params, workspaces, finally, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One task entry of a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTask {
    /// Task name, unique within the pipeline.
    pub name: String,

    /// Referenced task kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_ref: Option<TaskRef>,

    /// Remaining task fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Reference to a Task or ClusterTask.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskRef {
    /// Referenced task name.
    pub name: String,

    /// `Task` or `ClusterTask`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl PipelineSpec {
    /// Count the tasks that reference the given task name.
    pub fn count_tasks_referencing(&self, task_name: &str) -> usize {
        self.tasks
            .iter()
            .filter(|task| {
                task.task_ref
                    .as_ref()
                    .is_some_and(|task_ref| task_ref.name == task_name)
            })
            .count()
    }
}
