//! Annotation contract used to correlate pipelines and runs.
//!
//! Two annotations are read: the action (`stage` or `cutover`) and, on stage
//! objects and cutover runs, the name of the cutover pipeline they belong to.
//! Everything else in the annotation map is ignored.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Annotation holding the object's [`CranePipelineAction`].
pub const ACTION_ANNOTATION: &str = "crane-ui-plugin.konveyor.io/action";

/// Annotation holding the name of the cutover pipeline an object belongs to.
pub const ASSOCIATED_CUTOVER_PIPELINE_ANNOTATION: &str =
    "crane-ui-plugin.konveyor.io/associated-cutover-pipeline";

/// The migration step a pipeline or run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CranePipelineAction {
    /// Non-destructive data pre-copy.
    Stage,
    /// Final, owning migration step.
    Cutover,
}

impl CranePipelineAction {
    /// Annotation value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stage => "stage",
            Self::Cutover => "cutover",
        }
    }

    /// Capitalized label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stage => "Stage",
            Self::Cutover => "Cutover",
        }
    }
}

impl fmt::Display for CranePipelineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CranePipelineAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stage" => Ok(Self::Stage),
            "cutover" => Ok(Self::Cutover),
            other => Err(format!("unknown pipeline action '{}'", other)),
        }
    }
}

/// The crane annotations of one object, pulled out of the untyped map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CraneAnnotations {
    /// Parsed action; `None` when absent or unrecognised.
    pub action: Option<CranePipelineAction>,
    /// Name of the owning cutover pipeline.
    pub associated_cutover_pipeline: Option<String>,
}

impl CraneAnnotations {
    /// Read the crane annotations from object metadata.
    pub fn from_meta(meta: &ObjectMeta) -> Self {
        let Some(annotations) = meta.annotations.as_ref() else {
            return Self::default();
        };

        Self {
            action: annotations
                .get(ACTION_ANNOTATION)
                .and_then(|value| value.parse().ok()),
            associated_cutover_pipeline: annotations
                .get(ASSOCIATED_CUTOVER_PIPELINE_ANNOTATION)
                .filter(|value| !value.is_empty())
                .cloned(),
        }
    }

    /// Write these annotations into object metadata, leaving other keys untouched.
    pub fn apply_to(&self, meta: &mut ObjectMeta) {
        let annotations = meta.annotations.get_or_insert_with(Default::default);
        if let Some(action) = self.action {
            annotations.insert(ACTION_ANNOTATION.to_string(), action.to_string());
        }
        if let Some(cutover) = &self.associated_cutover_pipeline {
            annotations.insert(
                ASSOCIATED_CUTOVER_PIPELINE_ANNOTATION.to_string(),
                cutover.clone(),
            );
        }
    }
}
