//! Pipeline groups: one stage pipeline, one cutover pipeline and their runs.
//!
//! Groups are derived from the flat pipeline and run lists of a namespace on
//! every snapshot. They are never stored and never mutated; correlation uses
//! the annotations from [`crate::annotations`] only.

use crate::annotations::{CraneAnnotations, CranePipelineAction};
use crate::crd::{Pipeline, PipelineRun, TRANSFER_PVC_TASK};
use crate::status::{RunResult, started_at};
use chrono::{DateTime, Utc};
use kube::ResourceExt;

/// Suffix the import naming scheme appends to the cutover pipeline of a stateful import.
const CUTOVER_SUFFIX: &str = "-cutover";

/// The pipelines of a group.
#[derive(Debug, Clone)]
pub struct GroupPipelines {
    /// Stage pipeline, present only for stateful imports.
    pub stage: Option<Pipeline>,
    /// Cutover pipeline; every group has exactly one.
    pub cutover: Pipeline,
}

/// The runs of a group, newest first.
#[derive(Debug, Clone, Default)]
pub struct GroupRuns {
    /// Stage runs.
    pub stage: Vec<PipelineRun>,
    /// Cutover runs.
    pub cutover: Vec<PipelineRun>,
    /// Stage and cutover runs interleaved by creation time.
    pub all: Vec<PipelineRun>,
}

/// A logical migration: the pipelines of one import and every run of them.
#[derive(Debug, Clone)]
pub struct CranePipelineGroup {
    /// Group name (the cutover pipeline's name).
    pub name: String,
    /// Stage and cutover pipelines.
    pub pipelines: GroupPipelines,
    /// Associated runs.
    pub pipeline_runs: GroupRuns,
    /// Whether the import copies persistent volume claims.
    pub is_stateful_migration: bool,
}

/// One row of a group's run history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    /// Run name.
    pub name: String,
    /// Action the run performs.
    pub action: Option<CranePipelineAction>,
    /// Time the run started executing.
    pub started: Option<DateTime<Utc>>,
    /// Derived result.
    pub result: RunResult,
}

impl CranePipelineGroup {
    /// Name the group was imported under, without the `-cutover` suffix.
    pub fn import_name(&self) -> &str {
        if self.is_stateful_migration {
            self.name
                .strip_suffix(CUTOVER_SUFFIX)
                .filter(|name| !name.is_empty())
                .unwrap_or(self.name.as_str())
        } else {
            &self.name
        }
    }

    /// Pipeline performing the given action, if the group has one.
    pub fn pipeline(&self, action: CranePipelineAction) -> Option<&Pipeline> {
        match action {
            CranePipelineAction::Stage => self.pipelines.stage.as_ref(),
            CranePipelineAction::Cutover => Some(&self.pipelines.cutover),
        }
    }

    /// Runs for one action, or all runs when `action` is `None`. Newest first.
    pub fn runs(&self, action: Option<CranePipelineAction>) -> &[PipelineRun] {
        match action {
            Some(CranePipelineAction::Stage) => &self.pipeline_runs.stage,
            Some(CranePipelineAction::Cutover) => &self.pipeline_runs.cutover,
            None => &self.pipeline_runs.all,
        }
    }

    /// Most recently created run for an action, pending or not.
    pub fn latest_run(&self, action: CranePipelineAction) -> Option<&PipelineRun> {
        self.runs(Some(action)).first()
    }

    /// Number of persistent volume claims the stage pipeline transfers.
    pub fn pvc_count(&self) -> usize {
        self.pipelines
            .stage
            .as_ref()
            .map(|stage| stage.spec.count_tasks_referencing(TRANSFER_PVC_TASK))
            .unwrap_or(0)
    }

    /// Runs that have been released to execute, newest first.
    pub fn history(&self) -> Vec<HistoryRow> {
        self.pipeline_runs
            .all
            .iter()
            .filter(|run| !run.spec.is_pending())
            .map(|run| HistoryRow {
                name: run.name_any(),
                action: CraneAnnotations::from_meta(&run.metadata).action,
                started: started_at(run),
                result: RunResult::of(run),
            })
            .collect()
    }
}

/// Cutover pipeline a run belongs to.
///
/// The association annotation wins. Cutover runs created without one fall
/// back to the pipeline they reference.
fn run_cutover_pipeline<'a>(
    run: &'a PipelineRun,
    annotations: &'a CraneAnnotations,
) -> Option<&'a str> {
    match (
        annotations.associated_cutover_pipeline.as_deref(),
        annotations.action,
    ) {
        (Some(cutover), _) => Some(cutover),
        (None, Some(CranePipelineAction::Cutover)) => {
            run.spec.pipeline_ref.as_ref().map(|r| r.name.as_str())
        }
        _ => None,
    }
}

/// Join pipelines and runs into groups, one per cutover pipeline.
///
/// Groups follow the creation order of their cutover pipelines. Objects
/// without a recognised action annotation are ignored. Runs whose pipeline
/// has been deleted still land in their group by annotation.
pub fn build_pipeline_groups(
    pipelines: &[Pipeline],
    pipeline_runs: &[PipelineRun],
) -> Vec<CranePipelineGroup> {
    let mut pipelines: Vec<&Pipeline> = pipelines.iter().collect();
    pipelines.sort_by(|a, b| {
        a.metadata
            .creation_timestamp
            .cmp(&b.metadata.creation_timestamp)
    });

    let mut pipeline_runs: Vec<&PipelineRun> = pipeline_runs.iter().collect();
    pipeline_runs.sort_by(|a, b| {
        b.metadata
            .creation_timestamp
            .cmp(&a.metadata.creation_timestamp)
    });

    let mut stage_pipelines = Vec::new();
    let mut cutover_pipelines = Vec::new();
    for pipeline in pipelines {
        let annotations = CraneAnnotations::from_meta(&pipeline.metadata);
        match annotations.action {
            Some(CranePipelineAction::Stage) => stage_pipelines.push((pipeline, annotations)),
            Some(CranePipelineAction::Cutover) => cutover_pipelines.push(pipeline),
            None => {}
        }
    }

    let runs: Vec<(&PipelineRun, CraneAnnotations)> = pipeline_runs
        .into_iter()
        .map(|run| (run, CraneAnnotations::from_meta(&run.metadata)))
        .filter(|(_, annotations)| annotations.action.is_some())
        .collect();

    cutover_pipelines
        .into_iter()
        .map(|cutover| {
            let name = cutover.name_any();

            let stage = stage_pipelines
                .iter()
                .find(|(_, annotations)| {
                    annotations.associated_cutover_pipeline.as_deref() == Some(name.as_str())
                })
                .map(|(pipeline, _)| (*pipeline).clone());

            let mut group_runs = GroupRuns::default();
            for (run, annotations) in &runs {
                if run_cutover_pipeline(run, annotations) != Some(name.as_str()) {
                    continue;
                }
                match annotations.action {
                    Some(CranePipelineAction::Stage) => group_runs.stage.push((*run).clone()),
                    Some(CranePipelineAction::Cutover) => group_runs.cutover.push((*run).clone()),
                    None => continue,
                }
                group_runs.all.push((*run).clone());
            }

            let is_stateful_migration = stage.is_some() || !group_runs.stage.is_empty();

            CranePipelineGroup {
                name,
                pipelines: GroupPipelines {
                    stage,
                    cutover: cutover.clone(),
                },
                pipeline_runs: group_runs,
                is_stateful_migration,
            }
        })
        .collect()
}
