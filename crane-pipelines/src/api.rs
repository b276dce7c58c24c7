//! Cluster API seam used by the mutation operations.
//!
//! [`PipelineApi`] is the small set of remote calls the operations need.
//! [`KubePipelineApi`] implements it against a live cluster with `kube::Api`
//! handles scoped to one namespace.

use crate::crd::{Pipeline, PipelineRun};
use crate::error::{CraneError, CraneResult};
use k8s_openapi::api::core::v1::Secret;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use std::future::Future;

/// Remote calls against pipelines, runs and secrets of one namespace.
pub trait PipelineApi {
    /// Create a pipeline and return the stored object.
    fn create_pipeline(
        &self,
        pipeline: &Pipeline,
    ) -> impl Future<Output = CraneResult<Pipeline>> + Send;

    /// Create a run and return the stored object.
    fn create_pipeline_run(
        &self,
        run: &PipelineRun,
    ) -> impl Future<Output = CraneResult<PipelineRun>> + Send;

    /// Apply a JSON patch to a run.
    fn patch_pipeline_run(
        &self,
        name: &str,
        patch: json_patch::Patch,
    ) -> impl Future<Output = CraneResult<PipelineRun>> + Send;

    /// Apply a JSON patch to a secret.
    fn patch_secret(
        &self,
        name: &str,
        patch: json_patch::Patch,
    ) -> impl Future<Output = CraneResult<Secret>> + Send;

    /// Delete a pipeline. Dependents are reclaimed by owner references.
    fn delete_pipeline(&self, name: &str) -> impl Future<Output = CraneResult<()>> + Send;

    /// Delete a run.
    fn delete_pipeline_run(&self, name: &str) -> impl Future<Output = CraneResult<()>> + Send;
}

/// [`PipelineApi`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubePipelineApi {
    namespace: String,
    pipelines: Api<Pipeline>,
    pipeline_runs: Api<PipelineRun>,
    secrets: Api<Secret>,
}

impl KubePipelineApi {
    /// Create an API handle scoped to `namespace`.
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            pipelines: Api::namespaced(client.clone(), namespace),
            pipeline_runs: Api::namespaced(client.clone(), namespace),
            secrets: Api::namespaced(client, namespace),
        }
    }

    /// Fetch a secret by name.
    pub async fn get_secret(&self, name: &str) -> CraneResult<Secret> {
        self.secrets
            .get_opt(name)
            .await?
            .ok_or_else(|| CraneError::NotFound {
                kind: "Secret".into(),
                name: name.into(),
                namespace: self.namespace.clone(),
            })
    }
}

impl PipelineApi for KubePipelineApi {
    async fn create_pipeline(&self, pipeline: &Pipeline) -> CraneResult<Pipeline> {
        Ok(self
            .pipelines
            .create(&PostParams::default(), pipeline)
            .await?)
    }

    async fn create_pipeline_run(&self, run: &PipelineRun) -> CraneResult<PipelineRun> {
        Ok(self
            .pipeline_runs
            .create(&PostParams::default(), run)
            .await?)
    }

    async fn patch_pipeline_run(
        &self,
        name: &str,
        patch: json_patch::Patch,
    ) -> CraneResult<PipelineRun> {
        Ok(self
            .pipeline_runs
            .patch(name, &PatchParams::default(), &Patch::Json::<()>(patch))
            .await?)
    }

    async fn patch_secret(&self, name: &str, patch: json_patch::Patch) -> CraneResult<Secret> {
        Ok(self
            .secrets
            .patch(name, &PatchParams::default(), &Patch::Json::<()>(patch))
            .await?)
    }

    async fn delete_pipeline(&self, name: &str) -> CraneResult<()> {
        self.pipelines
            .delete(name, &DeleteParams::background())
            .await?;
        Ok(())
    }

    async fn delete_pipeline_run(&self, name: &str) -> CraneResult<()> {
        self.pipeline_runs
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}
