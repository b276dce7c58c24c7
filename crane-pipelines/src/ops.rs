//! Mutation operations: create an import, start a run, delete.
//!
//! Each operation is a single remote call or a short fixed sequence of calls
//! through a [`PipelineApi`]. Completion means the API server accepted the
//! change; the watched groups reflect it only after the next watch event.

use crate::annotations::CranePipelineAction;
use crate::api::PipelineApi;
use crate::crd::{Pipeline, PipelineRun};
use crate::error::{CraneError, CraneResult};
use crate::group::CranePipelineGroup;
use crate::resources::WizardTektonResources;
use futures::future::{self, OptionFuture};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use serde_json::json;

/// Result of starting a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedRun {
    /// Name of the run that was released or created.
    pub name: String,
    /// Action of the run.
    pub action: CranePipelineAction,
    /// `true` when a held run was released, `false` when a new run was cloned.
    pub reused_pending: bool,
}

/// Owner reference pointing at a stored pipeline.
pub fn owner_reference(pipeline: &Pipeline) -> CraneResult<OwnerReference> {
    let name = pipeline.name_any();
    let uid = pipeline.uid().ok_or_else(|| CraneError::MissingUid {
        kind: Pipeline::kind(&()).into_owned(),
        name: name.clone(),
    })?;

    Ok(OwnerReference {
        api_version: Pipeline::api_version(&()).into_owned(),
        kind: Pipeline::kind(&()).into_owned(),
        name,
        uid,
        ..Default::default()
    })
}

/// Append an owner reference to object metadata.
pub fn attach_owner_reference(meta: &mut ObjectMeta, owner: &OwnerReference) {
    meta.owner_references
        .get_or_insert_with(Vec::new)
        .push(owner.clone());
}

/// JSON patch adding `owner` to a secret's owner references.
///
/// Appends when the secret already has a list, creates the list otherwise.
pub fn secret_owner_reference_patch(
    secret: &Secret,
    owner: &OwnerReference,
) -> CraneResult<json_patch::Patch> {
    let operation = match secret.metadata.owner_references {
        Some(_) => json!({ "op": "add", "path": "/metadata/ownerReferences/-", "value": owner }),
        None => json!({ "op": "add", "path": "/metadata/ownerReferences", "value": [owner] }),
    };
    Ok(serde_json::from_value(json!([operation]))?)
}

/// JSON patch releasing a held run by removing `spec.status`.
///
/// The field is set before it is removed so the patch also applies to a run
/// that has already been released.
pub fn release_pending_patch() -> CraneResult<json_patch::Patch> {
    Ok(serde_json::from_value(json!([
        { "op": "add", "path": "/spec/status", "value": null },
        { "op": "remove", "path": "/spec/status" },
    ]))?)
}

/// Create the Tekton resources of a new import.
///
/// The cutover pipeline is created first and owns everything else. The
/// cutover run, stage pipeline and stage run are then created concurrently;
/// when one of them fails the others are left in place and the first error
/// is returned. Secrets get the same owner reference once all dependents
/// exist.
pub async fn create_tekton_resources<A: PipelineApi>(
    api: &A,
    resources: WizardTektonResources,
    secrets: &[Secret],
) -> CraneResult<WizardTektonResources> {
    resources.validate()?;

    let WizardTektonResources {
        stage_pipeline,
        stage_pipeline_run,
        cutover_pipeline,
        cutover_pipeline_run,
    } = resources;

    let cutover_pipeline = api.create_pipeline(&cutover_pipeline).await?;
    let owner = owner_reference(&cutover_pipeline)?;
    tracing::info!(
        pipeline = %cutover_pipeline.name_any(),
        uid = %owner.uid,
        "Created cutover pipeline"
    );

    let mut cutover_pipeline_run = cutover_pipeline_run;
    attach_owner_reference(&mut cutover_pipeline_run.metadata, &owner);
    let stage_pipeline = stage_pipeline.map(|mut pipeline| {
        attach_owner_reference(&mut pipeline.metadata, &owner);
        pipeline
    });
    let stage_pipeline_run = stage_pipeline_run.map(|mut run| {
        attach_owner_reference(&mut run.metadata, &owner);
        run
    });

    let (cutover_run, stage, stage_run) = future::join3(
        api.create_pipeline_run(&cutover_pipeline_run),
        OptionFuture::from(stage_pipeline.as_ref().map(|p| api.create_pipeline(p))),
        OptionFuture::from(
            stage_pipeline_run
                .as_ref()
                .map(|r| api.create_pipeline_run(r)),
        ),
    )
    .await;

    let stage = stage.transpose();
    let stage_run = stage_run.transpose();
    let failures = [
        cutover_run.as_ref().err(),
        stage.as_ref().err(),
        stage_run.as_ref().err(),
    ];
    for error in failures.into_iter().flatten() {
        tracing::warn!(
            owner = %owner.name,
            error = %error,
            "Failed to create dependent import resource; created resources are left in place"
        );
    }

    let cutover_pipeline_run = cutover_run?;
    let stage_pipeline = stage?;
    let stage_pipeline_run = stage_run?;

    let patches = secrets
        .iter()
        .map(|secret| {
            let patch = secret_owner_reference_patch(secret, &owner);
            let name = secret.name_any();
            async move { api.patch_secret(&name, patch?).await }
        })
        .collect::<Vec<_>>();
    future::try_join_all(patches).await?;

    tracing::info!(
        pipeline = %owner.name,
        stage = stage_pipeline.is_some(),
        secrets = secrets.len(),
        "Created import resources"
    );

    Ok(WizardTektonResources {
        stage_pipeline,
        stage_pipeline_run,
        cutover_pipeline,
        cutover_pipeline_run,
    })
}

/// New run repeating `template`: same spec without the held status, same
/// annotations and owner references, and a server-generated name.
pub fn clone_pipeline_run(template: &PipelineRun, pipeline_name: &str) -> PipelineRun {
    let mut spec = template.spec.clone();
    spec.status = None;

    PipelineRun {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", pipeline_name)),
            namespace: template.metadata.namespace.clone(),
            annotations: template.metadata.annotations.clone(),
            owner_references: template.metadata.owner_references.clone(),
            ..Default::default()
        },
        spec,
        status: None,
    }
}

/// Start the `action` run of a group.
///
/// A held latest run is released with a status-removal patch, so repeating
/// the call before the watch catches up patches the same run again instead
/// of creating another. Otherwise the latest run is cloned into a new one.
pub async fn start_pipeline_run<A: PipelineApi>(
    api: &A,
    group: &CranePipelineGroup,
    action: CranePipelineAction,
) -> CraneResult<StartedRun> {
    let latest = group
        .latest_run(action)
        .ok_or_else(|| CraneError::NoPipelineRun {
            group: group.name.clone(),
            action,
        })?;
    let latest_name = latest.name_any();

    if latest.spec.is_pending() {
        api.patch_pipeline_run(&latest_name, release_pending_patch()?)
            .await?;
        tracing::info!(
            group = %group.name,
            %action,
            run = %latest_name,
            "Released pending PipelineRun"
        );
        return Ok(StartedRun {
            name: latest_name,
            action,
            reused_pending: true,
        });
    }

    let pipeline_name = latest
        .spec
        .pipeline_ref
        .as_ref()
        .map(|r| r.name.clone())
        .or_else(|| group.pipeline(action).map(|p| p.name_any()))
        .unwrap_or_else(|| latest_name.clone());

    let created = api
        .create_pipeline_run(&clone_pipeline_run(latest, &pipeline_name))
        .await?;
    let name = created.name_any();
    tracing::info!(
        group = %group.name,
        %action,
        run = %name,
        template = %latest_name,
        "Created PipelineRun from latest run"
    );

    Ok(StartedRun {
        name,
        action,
        reused_pending: false,
    })
}

/// Delete one pipeline.
pub async fn delete_pipeline<A: PipelineApi>(api: &A, name: &str) -> CraneResult<()> {
    api.delete_pipeline(name).await?;
    tracing::info!(pipeline = %name, "Deleted pipeline");
    Ok(())
}

/// Delete one run.
pub async fn delete_pipeline_run<A: PipelineApi>(api: &A, name: &str) -> CraneResult<()> {
    api.delete_pipeline_run(name).await?;
    tracing::info!(run = %name, "Deleted PipelineRun");
    Ok(())
}

/// Delete a whole import by deleting its cutover pipeline.
///
/// Everything else carries an owner reference to it and is garbage collected.
pub async fn delete_pipeline_group<A: PipelineApi>(
    api: &A,
    group: &CranePipelineGroup,
) -> CraneResult<()> {
    delete_pipeline(api, &group.pipelines.cutover.name_any()).await
}
