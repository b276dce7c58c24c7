//! Common test utilities for integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use crane_pipelines::api::PipelineApi;
use crane_pipelines::crd::{Pipeline, PipelineRun};
use crane_pipelines::error::{CraneError, CraneResult};
use crane_pipelines::group::{CranePipelineGroup, build_pipeline_groups};
use crane_pipelines::resources::{ImportNames, ImportYaml, yaml_to_tekton_resources};
use crane_pipelines::WizardTektonResources;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NAMESPACE: &str = "demo";

pub const STAGE_PIPELINE: &str = r#"
apiVersion: tekton.dev/v1beta1
kind: Pipeline
metadata:
  name: stage
spec:
  tasks:
    - name: transfer-pvc-data
      taskRef:
        name: crane-transfer-pvc
    - name: transfer-pvc-logs
      taskRef:
        name: crane-transfer-pvc
"#;

pub const CUTOVER_PIPELINE: &str = r#"
apiVersion: tekton.dev/v1beta1
kind: Pipeline
metadata:
  name: cutover
spec:
  tasks:
    - name: quiesce
      taskRef:
        name: crane-kubectl-scale-down
    - name: transfer-pvc-data
      taskRef:
        name: crane-transfer-pvc
    - name: apply
      taskRef:
        name: crane-kubectl-apply
"#;

pub const PIPELINE_RUN: &str = r#"
apiVersion: tekton.dev/v1beta1
kind: PipelineRun
metadata: {}
spec:
  params:
    - name: source-cluster-secret
      value: source-cluster
  workspaces:
    - name: kubeconfig
      emptyDir: {}
"#;

/// Annotated resources of a stateful import named `name`.
pub fn stateful_import(name: &str) -> WizardTektonResources {
    let yaml = ImportYaml {
        stage_pipeline: Some(STAGE_PIPELINE.into()),
        stage_pipeline_run: Some(PIPELINE_RUN.into()),
        cutover_pipeline: CUTOVER_PIPELINE.into(),
        cutover_pipeline_run: PIPELINE_RUN.into(),
    };
    let mut resources = yaml_to_tekton_resources(&yaml).expect("Failed to parse import YAML");
    resources.annotate(&ImportNames::new(name, true));
    resources
}

/// Annotated resources of a stateless import named `name`.
pub fn stateless_import(name: &str) -> WizardTektonResources {
    let yaml = ImportYaml {
        cutover_pipeline: CUTOVER_PIPELINE.into(),
        cutover_pipeline_run: PIPELINE_RUN.into(),
        ..Default::default()
    };
    let mut resources = yaml_to_tekton_resources(&yaml).expect("Failed to parse import YAML");
    resources.annotate(&ImportNames::new(name, false));
    resources
}

#[derive(Default)]
struct State {
    pipelines: BTreeMap<String, Pipeline>,
    pipeline_runs: BTreeMap<String, PipelineRun>,
    secrets: BTreeMap<String, Secret>,
    counter: u64,
    failures: Vec<(String, String)>,
    calls: Vec<String>,
}

impl State {
    fn check_failure(&self, kind: &str, name: &str) -> CraneResult<()> {
        let injected = self
            .failures
            .iter()
            .any(|(k, prefix)| k == kind && name.starts_with(prefix.as_str()));
        if injected {
            return Err(CraneError::InvalidResources(format!(
                "injected failure for {}/{}",
                kind, name
            )));
        }
        Ok(())
    }

    /// Assign server-side metadata the way the API server does on create.
    fn admit<K: Resource + Clone>(&mut self, kind: &str, obj: &K) -> CraneResult<K> {
        let mut obj = obj.clone();
        self.counter += 1;
        let n = self.counter;

        let meta = obj.meta_mut();
        let name = match (&meta.name, &meta.generate_name) {
            (Some(name), _) => name.clone(),
            (None, Some(prefix)) => format!("{}{:05}", prefix, n),
            (None, None) => {
                return Err(CraneError::InvalidResources(format!(
                    "{} needs a name or generateName",
                    kind
                )));
            }
        };
        self.calls.push(format!("create {} {}", kind, name));
        self.check_failure(kind, &name)?;

        meta.name = Some(name);
        meta.namespace = Some(NAMESPACE.into());
        meta.uid = Some(format!("uid-{}", n));
        meta.resource_version = Some(n.to_string());
        meta.creation_timestamp = Some(
            serde_json::from_value(json!(timestamp(n))).expect("Failed to build timestamp"),
        );
        Ok(obj)
    }
}

fn timestamp(n: u64) -> String {
    let base: DateTime<Utc> = "2024-05-01T10:00:00Z".parse().expect("valid base time");
    (base + Duration::minutes(n as i64)).to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn apply_json_patch<T: Serialize + DeserializeOwned>(
    obj: &T,
    patch: &json_patch::Patch,
) -> CraneResult<T> {
    let mut value = serde_json::to_value(obj)?;
    json_patch::patch(&mut value, patch)
        .map_err(|e| CraneError::SerializationError(e.to_string()))?;
    Ok(serde_json::from_value(value)?)
}

fn not_found(kind: &str, name: &str) -> CraneError {
    CraneError::NotFound {
        kind: kind.into(),
        name: name.into(),
        namespace: NAMESPACE.into(),
    }
}

/// In-memory namespace implementing [`PipelineApi`].
///
/// Deleting an object also deletes everything that names it in its owner
/// references, like the garbage collector does. Clones share the namespace.
#[derive(Default, Clone)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail creations of `kind` objects whose name starts with `name_prefix`.
    pub fn fail_create(&self, kind: &str, name_prefix: &str) {
        self.state
            .lock()
            .failures
            .push((kind.to_string(), name_prefix.to_string()));
    }

    pub fn add_secret(&self, name: &str, owner_references: Option<Vec<OwnerReference>>) -> Secret {
        let mut secret = Secret::default();
        secret.metadata.name = Some(name.into());
        secret.metadata.namespace = Some(NAMESPACE.into());
        secret.metadata.owner_references = owner_references;
        self.state
            .lock()
            .secrets
            .insert(name.to_string(), secret.clone());
        secret
    }

    pub fn secret(&self, name: &str) -> Option<Secret> {
        self.state.lock().secrets.get(name).cloned()
    }

    pub fn pipelines(&self) -> Vec<Pipeline> {
        self.state.lock().pipelines.values().cloned().collect()
    }

    pub fn pipeline_runs(&self) -> Vec<PipelineRun> {
        self.state.lock().pipeline_runs.values().cloned().collect()
    }

    pub fn pipeline_run(&self, name: &str) -> Option<PipelineRun> {
        self.state.lock().pipeline_runs.get(name).cloned()
    }

    /// Calls in the order they reached the fake.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Groups as a fully caught-up watch would derive them.
    pub fn groups(&self) -> Vec<CranePipelineGroup> {
        build_pipeline_groups(&self.pipelines(), &self.pipeline_runs())
    }

    pub fn group(&self, name: &str) -> CranePipelineGroup {
        self.groups()
            .into_iter()
            .find(|group| group.name == name)
            .unwrap_or_else(|| panic!("group {} not found", name))
    }

    /// Report a Tekton `Succeeded` condition on a run.
    pub fn set_run_condition(&self, name: &str, status: &str, reason: &str) {
        let mut state = self.state.lock();
        let run = state
            .pipeline_runs
            .get_mut(name)
            .unwrap_or_else(|| panic!("run {} not found", name));
        run.status = Some(
            serde_json::from_value(json!({
                "startTime": "2024-05-01T12:00:00Z",
                "conditions": [{ "type": "Succeeded", "status": status, "reason": reason }],
            }))
            .expect("Failed to build run status"),
        );
    }

    fn delete_owned_by(state: &mut State, uid: &str) {
        let owned = |refs: &Option<Vec<OwnerReference>>| {
            refs.as_ref()
                .is_some_and(|refs| refs.iter().any(|r| r.uid == uid))
        };
        let owned_pipelines: Vec<String> = state
            .pipelines
            .values()
            .filter(|p| owned(&p.metadata.owner_references))
            .map(|p| p.name_any())
            .collect();
        state
            .pipeline_runs
            .retain(|_, run| !owned(&run.metadata.owner_references));
        state
            .secrets
            .retain(|_, secret| !owned(&secret.metadata.owner_references));
        for name in owned_pipelines {
            if let Some(pipeline) = state.pipelines.remove(&name) {
                if let Some(uid) = pipeline.uid() {
                    Self::delete_owned_by(state, &uid);
                }
            }
        }
    }
}

impl PipelineApi for FakeCluster {
    async fn create_pipeline(&self, pipeline: &Pipeline) -> CraneResult<Pipeline> {
        let mut state = self.state.lock();
        let stored = state.admit("Pipeline", pipeline)?;
        state.pipelines.insert(stored.name_any(), stored.clone());
        Ok(stored)
    }

    async fn create_pipeline_run(&self, run: &PipelineRun) -> CraneResult<PipelineRun> {
        let mut state = self.state.lock();
        let stored = state.admit("PipelineRun", run)?;
        state.pipeline_runs.insert(stored.name_any(), stored.clone());
        Ok(stored)
    }

    async fn patch_pipeline_run(
        &self,
        name: &str,
        patch: json_patch::Patch,
    ) -> CraneResult<PipelineRun> {
        let mut state = self.state.lock();
        state.calls.push(format!("patch PipelineRun {}", name));
        let current = state
            .pipeline_runs
            .get(name)
            .ok_or_else(|| not_found("PipelineRun", name))?;
        let patched = apply_json_patch(current, &patch)?;
        state.pipeline_runs.insert(name.to_string(), patched.clone());
        Ok(patched)
    }

    async fn patch_secret(&self, name: &str, patch: json_patch::Patch) -> CraneResult<Secret> {
        let mut state = self.state.lock();
        state.calls.push(format!("patch Secret {}", name));
        let current = state
            .secrets
            .get(name)
            .ok_or_else(|| not_found("Secret", name))?;
        let patched = apply_json_patch(current, &patch)?;
        state.secrets.insert(name.to_string(), patched.clone());
        Ok(patched)
    }

    async fn delete_pipeline(&self, name: &str) -> CraneResult<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("delete Pipeline {}", name));
        let pipeline = state
            .pipelines
            .remove(name)
            .ok_or_else(|| not_found("Pipeline", name))?;
        if let Some(uid) = pipeline.uid() {
            Self::delete_owned_by(&mut state, &uid);
        }
        Ok(())
    }

    async fn delete_pipeline_run(&self, name: &str) -> CraneResult<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("delete PipelineRun {}", name));
        state
            .pipeline_runs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("PipelineRun", name))
    }
}
