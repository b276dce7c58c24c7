//! Import command - create the Tekton resources of a new import.

use super::Context;
use anyhow::{Context as _, Result};
use crane_pipelines::ops::create_tekton_resources;
use crane_pipelines::resources::yaml_to_tekton_resources;
use crane_pipelines::{ImportNames, ImportYaml};
use futures::future;
use kube::ResourceExt;
use std::path::PathBuf;

/// Documents passed on the command line.
pub struct ImportFiles {
    /// Cutover Pipeline YAML.
    pub cutover_pipeline: PathBuf,
    /// Cutover PipelineRun YAML.
    pub cutover_run: PathBuf,
    /// Stage Pipeline YAML.
    pub stage_pipeline: Option<PathBuf>,
    /// Stage PipelineRun YAML.
    pub stage_run: Option<PathBuf>,
}

/// Run the import command.
pub async fn run(ctx: &Context, name: &str, files: &ImportFiles, secrets: &[String]) -> Result<()> {
    let yaml = ImportYaml::from_files(
        &files.cutover_pipeline,
        &files.cutover_run,
        files.stage_pipeline.as_deref(),
        files.stage_run.as_deref(),
    )?;
    let mut resources = yaml_to_tekton_resources(&yaml)?;
    resources.validate()?;
    resources.annotate(&ImportNames::new(name, resources.is_stateful_migration()));

    let api = ctx.api();
    let secrets = future::try_join_all(secrets.iter().map(|secret| api.get_secret(secret)))
        .await
        .context("Failed to read secrets")?;

    tracing::info!(
        namespace = %ctx.namespace,
        name = %name,
        stateful = resources.is_stateful_migration(),
        secrets = secrets.len(),
        "Creating import"
    );

    let created = create_tekton_resources(&api, resources, &secrets)
        .await
        .context(format!("Failed to create import '{}'", name))?;

    println!("Created import {}", name);
    println!("  Pipeline     {}", created.cutover_pipeline.name_any());
    println!("  PipelineRun  {}", created.cutover_pipeline_run.name_any());
    if let Some(stage) = &created.stage_pipeline {
        println!("  Pipeline     {}", stage.name_any());
    }
    if let Some(stage_run) = &created.stage_pipeline_run {
        println!("  PipelineRun  {}", stage_run.name_any());
    }
    for secret in &secrets {
        println!("  Secret       {} (owned)", secret.name_any());
    }

    Ok(())
}
