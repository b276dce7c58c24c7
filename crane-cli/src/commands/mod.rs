//! CLI command implementations.

pub mod delete;
pub mod history;
pub mod import;
pub mod list;
pub mod start;
pub mod version;
pub mod watch;

use anyhow::{Context as _, Result};
use crane_pipelines::api::KubePipelineApi;
use crane_pipelines::classify::{DisabledReason, action_availability, has_run_with_status};
use crane_pipelines::watch::{PipelineGroupWatch, WatchedGroups};
use crane_pipelines::{CranePipelineAction, CranePipelineGroup, MutationState, RunResult};
use kube::Client;
use std::time::Duration;

/// Cluster connection shared by the commands.
pub struct Context {
    /// Kubernetes client.
    pub client: Client,
    /// Namespace all commands operate in.
    pub namespace: String,
    /// How long to wait for the watch to converge.
    pub timeout: Duration,
}

impl Context {
    /// Connect using the kubeconfig or in-cluster configuration.
    pub async fn connect(namespace: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("Failed to create Kubernetes client")?;
        let namespace = namespace.unwrap_or_else(|| client.default_namespace().to_string());

        tracing::debug!(namespace = %namespace, "Connected to cluster");

        Ok(Self {
            client,
            namespace,
            timeout,
        })
    }

    /// API handle for mutations.
    pub fn api(&self) -> KubePipelineApi {
        KubePipelineApi::new(self.client.clone(), &self.namespace)
    }

    /// Start watching the namespace and wait for the first complete listing.
    pub async fn load_groups(&self) -> Result<(PipelineGroupWatch, WatchedGroups)> {
        let watch = PipelineGroupWatch::new(self.client.clone());
        watch.start(&self.namespace);

        let groups = watch
            .wait_until(|groups| groups.loaded, self.timeout)
            .await
            .map_err(|e| match watch.groups().error {
                Some(watch_error) => anyhow::anyhow!("{}: {}", e, watch_error),
                None => e.into(),
            })
            .context(format!(
                "Failed to load pipelines in namespace '{}'",
                self.namespace
            ))?;

        Ok((watch, groups))
    }
}

/// Find a group by its name or import name.
pub fn find_group<'a>(
    groups: &'a WatchedGroups,
    name: &str,
    namespace: &str,
) -> Result<&'a CranePipelineGroup> {
    groups.find(name).ok_or_else(|| {
        anyhow::anyhow!("No import named '{}' in namespace '{}'", name, namespace)
    })
}

/// One-word state of a group for listings.
pub fn group_state(group: &CranePipelineGroup) -> String {
    let idle = MutationState::Idle;
    let cutover = action_availability(group, CranePipelineAction::Cutover, &idle);
    match cutover.disabled_reason {
        Some(DisabledReason::GroupBroken) => "broken",
        Some(DisabledReason::AlreadyRunning) => "running",
        _ if has_run_with_status(group, CranePipelineAction::Cutover, RunResult::Succeeded) => {
            "done"
        }
        None => "ready",
        Some(_) => "busy",
    }
    .to_string()
}
