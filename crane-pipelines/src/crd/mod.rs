//! Typed Tekton resources read and written by crane.
//!
//! - [`Pipeline`]: a template of ordered tasks
//! - [`PipelineRun`]: one execution of a pipeline
//!
//! Both are owned by Tekton; the derives only provide `kube::Resource` so
//! they can be used with `kube::Api` and the runtime watcher.

mod pipeline;
mod pipeline_run;

pub use pipeline::{Pipeline, PipelineSpec, PipelineTask, TRANSFER_PVC_TASK, TaskRef};
pub use pipeline_run::{
    PIPELINE_RUN_PENDING, PipelineRef, PipelineRun, PipelineRunSpec, PipelineRunStatus,
    RunCondition,
};
