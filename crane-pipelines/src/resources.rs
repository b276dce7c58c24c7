//! Tekton resources of a new import.
//!
//! An import consists of a cutover pipeline and run and, when persistent
//! volume claims are copied, a stage pipeline and run. The operator supplies
//! the documents as YAML; [`WizardTektonResources::annotate`] then stamps the
//! names and annotations that let the group builder find them again.

use crate::annotations::{CraneAnnotations, CranePipelineAction};
use crate::crd::{PIPELINE_RUN_PENDING, Pipeline, PipelineRef, PipelineRun};
use crate::error::{CraneError, CraneResult};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Pipeline names of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportNames {
    /// Stage pipeline name (`<group>-stage`).
    pub stage: String,
    /// Cutover pipeline name (`<group>-cutover` when stateful, else `<group>`).
    pub cutover: String,
}

impl ImportNames {
    /// Derive pipeline names from the import name.
    pub fn new(group_name: &str, is_stateful_migration: bool) -> Self {
        Self {
            stage: format!("{}-stage", group_name),
            cutover: if is_stateful_migration {
                format!("{}-cutover", group_name)
            } else {
                group_name.to_string()
            },
        }
    }
}

/// YAML documents of an import, as typed or edited by the operator.
#[derive(Debug, Clone, Default)]
pub struct ImportYaml {
    /// Stage pipeline document.
    pub stage_pipeline: Option<String>,
    /// Stage run document.
    pub stage_pipeline_run: Option<String>,
    /// Cutover pipeline document.
    pub cutover_pipeline: String,
    /// Cutover run document.
    pub cutover_pipeline_run: String,
}

impl ImportYaml {
    /// Read the documents from files.
    pub fn from_files(
        cutover_pipeline: &Path,
        cutover_pipeline_run: &Path,
        stage_pipeline: Option<&Path>,
        stage_pipeline_run: Option<&Path>,
    ) -> CraneResult<Self> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|e| {
                CraneError::IoError(format!("Failed to read '{}': {}", path.display(), e))
            })
        };

        Ok(Self {
            stage_pipeline: stage_pipeline.map(read).transpose()?,
            stage_pipeline_run: stage_pipeline_run.map(read).transpose()?,
            cutover_pipeline: read(cutover_pipeline)?,
            cutover_pipeline_run: read(cutover_pipeline_run)?,
        })
    }
}

/// The objects to create for one import.
#[derive(Debug, Clone)]
pub struct WizardTektonResources {
    /// Stage pipeline.
    pub stage_pipeline: Option<Pipeline>,
    /// Stage run.
    pub stage_pipeline_run: Option<PipelineRun>,
    /// Cutover pipeline; owns everything else.
    pub cutover_pipeline: Pipeline,
    /// Cutover run.
    pub cutover_pipeline_run: PipelineRun,
}

fn parse_document<T: DeserializeOwned>(document: &str, yaml: &str) -> CraneResult<T> {
    serde_yaml::from_str(yaml).map_err(|e| CraneError::Yaml {
        document: document.to_string(),
        message: e.to_string(),
    })
}

/// Parse the YAML documents of an import into typed resources.
///
/// Empty stage documents are treated as absent.
pub fn yaml_to_tekton_resources(yaml: &ImportYaml) -> CraneResult<WizardTektonResources> {
    let present = |doc: &Option<String>| doc.clone().filter(|s| !s.trim().is_empty());

    Ok(WizardTektonResources {
        stage_pipeline: present(&yaml.stage_pipeline)
            .map(|doc| parse_document("stage Pipeline", &doc))
            .transpose()?,
        stage_pipeline_run: present(&yaml.stage_pipeline_run)
            .map(|doc| parse_document("stage PipelineRun", &doc))
            .transpose()?,
        cutover_pipeline: parse_document("cutover Pipeline", &yaml.cutover_pipeline)?,
        cutover_pipeline_run: parse_document("cutover PipelineRun", &yaml.cutover_pipeline_run)?,
    })
}

impl WizardTektonResources {
    /// Whether the import copies persistent volume claims.
    pub fn is_stateful_migration(&self) -> bool {
        self.stage_pipeline.is_some()
    }

    /// Check that stage resources come in pairs.
    pub fn validate(&self) -> CraneResult<()> {
        match (&self.stage_pipeline, &self.stage_pipeline_run) {
            (Some(_), None) => Err(CraneError::InvalidResources(
                "a stage Pipeline requires a stage PipelineRun".into(),
            )),
            (None, Some(_)) => Err(CraneError::InvalidResources(
                "a stage PipelineRun requires a stage Pipeline".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Stamp import names, correlation annotations and pipeline references.
    ///
    /// Runs are created held (`PipelineRunPending`) and get a generated name
    /// unless the document already names them.
    pub fn annotate(&mut self, names: &ImportNames) {
        let cutover = &names.cutover;

        self.cutover_pipeline.metadata.name = Some(cutover.clone());
        self.cutover_pipeline.metadata.generate_name = None;
        CraneAnnotations {
            action: Some(CranePipelineAction::Cutover),
            associated_cutover_pipeline: None,
        }
        .apply_to(&mut self.cutover_pipeline.metadata);

        prepare_run(
            &mut self.cutover_pipeline_run,
            cutover,
            CranePipelineAction::Cutover,
            cutover,
        );

        if let Some(stage) = self.stage_pipeline.as_mut() {
            stage.metadata.name = Some(names.stage.clone());
            stage.metadata.generate_name = None;
            CraneAnnotations {
                action: Some(CranePipelineAction::Stage),
                associated_cutover_pipeline: Some(cutover.clone()),
            }
            .apply_to(&mut stage.metadata);
        }

        if let Some(run) = self.stage_pipeline_run.as_mut() {
            prepare_run(run, &names.stage, CranePipelineAction::Stage, cutover);
        }
    }
}

fn prepare_run(
    run: &mut PipelineRun,
    pipeline: &str,
    action: CranePipelineAction,
    cutover: &str,
) {
    if run.metadata.name.is_none() && run.metadata.generate_name.is_none() {
        run.metadata.generate_name = Some(format!("{}-", pipeline));
    }
    CraneAnnotations {
        action: Some(action),
        associated_cutover_pipeline: Some(cutover.to_string()),
    }
    .apply_to(&mut run.metadata);
    run.spec.pipeline_ref = Some(PipelineRef {
        name: pipeline.to_string(),
    });
    run.spec.status = Some(PIPELINE_RUN_PENDING.to_string());
}
