//! Crane pipeline imports on Tekton
//!
//! An application import is a cutover pipeline and, when persistent volume
//! claims are copied, a stage pipeline, each with its runs. This crate
//! correlates those objects into pipeline groups, classifies the state of
//! their runs and performs the mutations an operator can take on them.
//!
//! # Data flow
//!
//! - [`watch`]: live pipeline and run lists of one namespace
//! - [`group`]: pipelines and runs joined into [`CranePipelineGroup`]s
//! - [`classify`]: predicates deciding which actions are available
//! - [`ops`]: create an import, start a run, delete
//!
//! # Annotations
//!
//! ```yaml
//! metadata:
//!   annotations:
//!     crane-ui-plugin.konveyor.io/action: stage
//!     crane-ui-plugin.konveyor.io/associated-cutover-pipeline: app1-cutover
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod annotations;
pub mod api;
pub mod classify;
pub mod crd;
pub mod error;
pub mod group;
pub mod mutation;
pub mod observability;
pub mod ops;
pub mod resources;
pub mod status;
pub mod watch;

pub use annotations::{CraneAnnotations, CranePipelineAction};
pub use api::{KubePipelineApi, PipelineApi};
pub use crd::{Pipeline, PipelineRun};
pub use error::{CraneError, CraneResult};
pub use group::{CranePipelineGroup, build_pipeline_groups};
pub use mutation::{Mutation, MutationState};
pub use ops::StartedRun;
pub use resources::{ImportNames, ImportYaml, WizardTektonResources};
pub use status::RunResult;
pub use watch::{PipelineGroupWatch, WatchedGroups};
