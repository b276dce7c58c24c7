//! Live, namespace-scoped lists of pipelines and runs.
//!
//! A [`ResourceWatch`] runs the kube runtime watcher on a background task and
//! folds its events into a [`WatchState`]. Callers read [`WatchSnapshot`]s and
//! may subscribe to the epoch counter to learn about changes. Watch failures
//! are recorded in the snapshot's `error` field and never returned.
//!
//! [`PipelineGroupWatch`] pairs a pipeline watch with a run watch and derives
//! pipeline groups from their combined snapshots.

use crate::crd::{Pipeline, PipelineRun};
use crate::error::{CraneError, CraneResult};
use crate::group::{CranePipelineGroup, build_pipeline_groups};
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, Event, watcher};
use kube::{Api, Client, Resource, ResourceExt};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch as notify;
use tokio::task::JoinHandle;

/// Point-in-time view of a watched collection.
#[derive(Debug, Clone)]
pub struct WatchSnapshot<K> {
    /// Objects currently in the collection, ordered by name.
    pub data: Vec<K>,
    /// Whether the initial listing has completed.
    pub loaded: bool,
    /// Last watch failure, cleared by the next successful event.
    pub error: Option<String>,
    /// Number of state transitions so far.
    pub epoch: u64,
}

/// Objects of one collection, folded from watcher events.
#[derive(Debug, Clone)]
pub struct WatchState<K> {
    items: BTreeMap<String, K>,
    relist: Option<BTreeMap<String, K>>,
    loaded: bool,
    error: Option<String>,
    epoch: u64,
}

impl<K> Default for WatchState<K> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            relist: None,
            loaded: false,
            error: None,
            epoch: 0,
        }
    }
}

impl<K: Resource + Clone> WatchState<K> {
    /// Apply one watcher event.
    ///
    /// Objects listed during a (re)list are buffered and replace the
    /// collection only once the listing is done, so a relist never exposes a
    /// partial collection.
    pub fn apply(&mut self, event: Event<K>) {
        match event {
            Event::Init => {
                self.relist = Some(BTreeMap::new());
            }
            Event::InitApply(obj) => {
                self.relist
                    .get_or_insert_with(BTreeMap::new)
                    .insert(obj.name_any(), obj);
            }
            Event::InitDone => {
                self.items = self.relist.take().unwrap_or_default();
                self.loaded = true;
                self.error = None;
            }
            Event::Apply(obj) => {
                self.items.insert(obj.name_any(), obj);
                self.error = None;
            }
            Event::Delete(obj) => {
                self.items.remove(&obj.name_any());
                self.error = None;
            }
        }
        self.epoch += 1;
    }

    /// Record a watch failure. Data already loaded is kept.
    pub fn apply_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.epoch += 1;
    }

    /// Drop all objects, as when the watched namespace changes.
    pub fn clear(&mut self) {
        self.items.clear();
        self.relist = None;
        self.loaded = false;
        self.error = None;
        self.epoch += 1;
    }

    /// Current state as a snapshot.
    pub fn snapshot(&self) -> WatchSnapshot<K> {
        WatchSnapshot {
            data: self.items.values().cloned().collect(),
            loaded: self.loaded,
            error: self.error.clone(),
            epoch: self.epoch,
        }
    }

    /// Number of state transitions so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[derive(Debug)]
struct Inner<K> {
    state: WatchState<K>,
    generation: u64,
    namespace: Option<String>,
}

/// State shared between a [`ResourceWatch`] and its watcher task.
#[derive(Debug)]
struct Shared<K> {
    inner: RwLock<Inner<K>>,
    epoch_tx: notify::Sender<u64>,
}

impl<K: Resource + Clone> Shared<K> {
    fn new() -> Self {
        let (epoch_tx, _) = notify::channel(0);
        Self {
            inner: RwLock::new(Inner {
                state: WatchState::default(),
                generation: 0,
                namespace: None,
            }),
            epoch_tx,
        }
    }

    /// Switch to `namespace` (or to nothing) and return the new generation.
    fn begin(&self, namespace: Option<String>) -> u64 {
        let (generation, epoch) = {
            let mut inner = self.inner.write();
            inner.generation += 1;
            inner.namespace = namespace;
            inner.state.clear();
            (inner.generation, inner.state.epoch())
        };
        self.epoch_tx.send_replace(epoch);
        generation
    }

    /// Apply an event produced by the watcher of `generation`.
    ///
    /// Returns `false` once the generation is stale; the event is dropped.
    fn apply(&self, generation: u64, event: Result<Event<K>, String>) -> bool {
        let epoch = {
            let mut inner = self.inner.write();
            if inner.generation != generation {
                return false;
            }
            match event {
                Ok(event) => inner.state.apply(event),
                Err(message) => inner.state.apply_error(message),
            }
            inner.state.epoch()
        };
        self.epoch_tx.send_replace(epoch);
        true
    }
}

/// The watcher task of a [`ResourceWatch`] and the state it feeds.
///
/// Each restart begins a new generation and aborts the previous task.
struct WatchTask<K> {
    shared: Arc<Shared<K>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<K: Resource + Clone> WatchTask<K> {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            task: Mutex::new(None),
        }
    }

    /// Begin a generation on `namespace` and install the task `spawn` builds for it.
    fn restart<F>(&self, namespace: &str, spawn: F)
    where
        F: FnOnce(Arc<Shared<K>>, u64) -> JoinHandle<()>,
    {
        let generation = self.shared.begin(Some(namespace.to_string()));
        let handle = spawn(Arc::clone(&self.shared), generation);

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Abort the task and clear the state. Returns whether a task was running.
    fn stop(&self) -> bool {
        self.shared.begin(None);
        match self.task.lock().take() {
            Some(previous) => {
                previous.abort();
                true
            }
            None => false,
        }
    }
}

impl<K> Drop for WatchTask<K> {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

/// Background watch of one resource kind in one namespace.
///
/// Nothing is watched until [`ResourceWatch::start`]. Starting again, on the
/// same or another namespace, tears down the previous watcher first; events
/// still in flight from it are discarded. Dropping the watch aborts its task.
pub struct ResourceWatch<K> {
    client: Client,
    task: WatchTask<K>,
}

impl<K> ResourceWatch<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    /// Create an idle watch.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            task: WatchTask::new(),
        }
    }

    /// Watch `namespace`, replacing any previous subscription.
    pub fn start(&self, namespace: &str) {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        self.task.restart(namespace, |shared, generation| {
            tokio::spawn(run_watcher(api, shared, generation, namespace.to_string()))
        });
    }

    /// Stop watching and drop the collection.
    pub fn stop(&self) {
        if self.task.stop() {
            tracing::debug!(kind = %K::kind(&()), "Watch stopped");
        }
    }

    /// Namespace currently watched.
    pub fn namespace(&self) -> Option<String> {
        self.task.shared.inner.read().namespace.clone()
    }

    /// Current contents of the collection.
    pub fn snapshot(&self) -> WatchSnapshot<K> {
        self.task.shared.inner.read().state.snapshot()
    }

    /// Receiver that observes every epoch change.
    pub fn subscribe(&self) -> notify::Receiver<u64> {
        self.task.shared.epoch_tx.subscribe()
    }
}

async fn run_watcher<K>(api: Api<K>, shared: Arc<Shared<K>>, generation: u64, namespace: String)
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    let kind = K::kind(&()).into_owned();
    let mut stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();

    tracing::info!(kind = %kind, namespace = %namespace, "Watch started");

    while let Some(event) = stream.next().await {
        let event = event.map_err(|e| {
            tracing::warn!(kind = %kind, namespace = %namespace, error = %e, "Watch error");
            e.to_string()
        });
        if let Ok(Event::InitDone) = &event {
            tracing::debug!(kind = %kind, namespace = %namespace, "Initial list complete");
        }
        if !shared.apply(generation, event) {
            tracing::debug!(kind = %kind, namespace = %namespace, "Watch superseded");
            return;
        }
    }

    tracing::warn!(kind = %kind, namespace = %namespace, "Watch stream ended");
}

/// Pipeline groups derived from the current watch snapshots.
#[derive(Debug, Clone)]
pub struct WatchedGroups {
    /// Groups in cutover pipeline creation order.
    pub groups: Vec<CranePipelineGroup>,
    /// Whether both pipelines and runs have loaded.
    pub loaded: bool,
    /// First watch failure, if any.
    pub error: Option<String>,
    /// Combined epoch of both watches; increases on every change.
    pub epoch: u64,
}

impl WatchedGroups {
    /// Group with the given name.
    ///
    /// A cutover pipeline name wins over an import name, so `app1` resolves
    /// to the stateless import `app1` even when a stateful import `app1`
    /// (cutover pipeline `app1-cutover`) also exists.
    pub fn find(&self, name: &str) -> Option<&CranePipelineGroup> {
        self.groups
            .iter()
            .find(|group| group.name == name)
            .or_else(|| self.groups.iter().find(|group| group.import_name() == name))
    }
}

/// Change notifications from both watches of a [`PipelineGroupWatch`].
pub struct GroupChanges {
    pipelines: notify::Receiver<u64>,
    pipeline_runs: notify::Receiver<u64>,
}

impl GroupChanges {
    /// Wait until either collection changes.
    pub async fn changed(&mut self) -> CraneResult<()> {
        let result = tokio::select! {
            r = self.pipelines.changed() => r,
            r = self.pipeline_runs.changed() => r,
        };
        result.map_err(|_| CraneError::WatchClosed)
    }
}

/// Watches pipelines and runs of one namespace and derives groups.
pub struct PipelineGroupWatch {
    pipelines: ResourceWatch<Pipeline>,
    pipeline_runs: ResourceWatch<PipelineRun>,
}

impl PipelineGroupWatch {
    /// Create an idle watch pair.
    pub fn new(client: Client) -> Self {
        Self {
            pipelines: ResourceWatch::new(client.clone()),
            pipeline_runs: ResourceWatch::new(client),
        }
    }

    /// Watch `namespace`, replacing any previous subscription.
    pub fn start(&self, namespace: &str) {
        self.pipelines.start(namespace);
        self.pipeline_runs.start(namespace);
    }

    /// Stop both watches.
    pub fn stop(&self) {
        self.pipelines.stop();
        self.pipeline_runs.stop();
    }

    /// Groups built from the current snapshots.
    pub fn groups(&self) -> WatchedGroups {
        combine(self.pipelines.snapshot(), self.pipeline_runs.snapshot())
    }

    /// Subscribe to changes of either collection.
    pub fn subscribe(&self) -> GroupChanges {
        GroupChanges {
            pipelines: self.pipelines.subscribe(),
            pipeline_runs: self.pipeline_runs.subscribe(),
        }
    }

    /// Wait until the derived groups satisfy `condition`.
    pub async fn wait_until<F>(&self, condition: F, timeout: Duration) -> CraneResult<WatchedGroups>
    where
        F: Fn(&WatchedGroups) -> bool,
    {
        let mut changes = self.subscribe();
        let wait = async {
            loop {
                let groups = self.groups();
                if condition(&groups) {
                    return Ok::<_, CraneError>(groups);
                }
                changes.changed().await?;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| CraneError::WatchTimeout {
                condition: "pipeline groups to converge".into(),
                waited: timeout,
            })?
    }
}

fn combine(
    pipelines: WatchSnapshot<Pipeline>,
    pipeline_runs: WatchSnapshot<PipelineRun>,
) -> WatchedGroups {
    WatchedGroups {
        groups: build_pipeline_groups(&pipelines.data, &pipeline_runs.data),
        loaded: pipelines.loaded && pipeline_runs.loaded,
        error: pipelines.error.or(pipeline_runs.error),
        epoch: pipelines.epoch + pipeline_runs.epoch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::fixtures::*;
    use tokio::sync::oneshot::error::TryRecvError;

    const T1: &str = "2024-05-01T10:00:00Z";
    const T2: &str = "2024-05-01T11:00:00Z";

    fn cutover(name: &str) -> Pipeline {
        pipeline(name, "cutover", None, T1)
    }

    #[test]
    fn relist_replaces_collection_on_init_done() {
        let mut state = WatchState::default();
        state.apply(Event::Init);
        state.apply(Event::InitApply(cutover("a")));
        assert!(!state.snapshot().loaded);
        assert!(state.snapshot().data.is_empty());

        state.apply(Event::InitDone);
        let snapshot = state.snapshot();
        assert!(snapshot.loaded);
        assert_eq!(snapshot.data.len(), 1);
        assert_eq!(snapshot.epoch, 3);

        // A relist that no longer contains "a" drops it.
        state.apply(Event::Init);
        state.apply(Event::InitApply(cutover("b")));
        assert_eq!(state.snapshot().data[0].name_any(), "a");
        state.apply(Event::InitDone);
        let names: Vec<_> = state.snapshot().data.iter().map(|p| p.name_any()).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn apply_and_delete_update_by_name() {
        let mut state = WatchState::default();
        state.apply(Event::Init);
        state.apply(Event::InitDone);

        state.apply(Event::Apply(cutover("a")));
        let mut updated = cutover("a");
        updated.metadata.resource_version = Some("2".into());
        state.apply(Event::Apply(updated));
        state.apply(Event::Apply(cutover("b")));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.data.len(), 2);
        assert_eq!(snapshot.data[0].metadata.resource_version.as_deref(), Some("2"));

        state.apply(Event::Delete(cutover("a")));
        assert_eq!(state.snapshot().data.len(), 1);
    }

    #[test]
    fn errors_are_fields_and_keep_data() {
        let mut state = WatchState::default();
        state.apply(Event::Init);
        state.apply(Event::InitApply(cutover("a")));
        state.apply(Event::InitDone);

        state.apply_error("connection reset");
        let snapshot = state.snapshot();
        assert_eq!(snapshot.error.as_deref(), Some("connection reset"));
        assert_eq!(snapshot.data.len(), 1);
        assert!(snapshot.loaded);

        state.apply(Event::Apply(cutover("b")));
        assert!(state.snapshot().error.is_none());
    }

    #[test]
    fn stale_generation_events_are_discarded() {
        let shared = Shared::<Pipeline>::new();
        let mut epochs = shared.epoch_tx.subscribe();

        let first = shared.begin(Some("ns-a".into()));
        shared.apply(first, Ok(Event::Init));
        shared.apply(first, Ok(Event::InitApply(cutover("from-a"))));
        shared.apply(first, Ok(Event::InitDone));
        assert_eq!(shared.inner.read().state.snapshot().data.len(), 1);

        let second = shared.begin(Some("ns-b".into()));
        let snapshot = shared.inner.read().state.snapshot();
        assert!(snapshot.data.is_empty());
        assert!(!snapshot.loaded);

        assert!(!shared.apply(first, Ok(Event::Apply(cutover("late-from-a")))));
        assert!(shared.apply(second, Ok(Event::Init)));
        assert!(shared.apply(second, Ok(Event::InitDone)));

        let snapshot = shared.inner.read().state.snapshot();
        assert!(snapshot.loaded);
        assert!(snapshot.data.is_empty());
        assert_eq!(*epochs.borrow_and_update(), snapshot.epoch);
    }

    /// A task that never finishes; `alive` closes once it is aborted.
    fn placeholder() -> (JoinHandle<()>, tokio::sync::oneshot::Receiver<()>) {
        let (tx, alive) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await
        });
        (handle, alive)
    }

    async fn assert_aborted(alive: tokio::sync::oneshot::Receiver<()>) {
        let closed = tokio::time::timeout(Duration::from_secs(5), alive)
            .await
            .expect("task was not aborted");
        assert!(closed.is_err());
    }

    #[tokio::test]
    async fn restart_aborts_the_previous_task() {
        let watch = WatchTask::<Pipeline>::new();
        let (first, first_alive) = placeholder();
        let mut generations = Vec::new();

        watch.restart("ns-a", |_, generation| {
            generations.push(generation);
            first
        });
        let first_gen = generations[0];
        assert!(watch.shared.apply(first_gen, Ok(Event::Init)));
        assert!(watch.shared.apply(first_gen, Ok(Event::InitApply(cutover("a")))));
        assert!(watch.shared.apply(first_gen, Ok(Event::InitDone)));

        let (second, mut second_alive) = placeholder();
        watch.restart("ns-b", |_, generation| {
            generations.push(generation);
            second
        });

        assert!(generations[1] > generations[0]);
        assert_aborted(first_alive).await;
        assert_eq!(second_alive.try_recv(), Err(TryRecvError::Empty));

        let inner = watch.shared.inner.read();
        assert_eq!(inner.namespace.as_deref(), Some("ns-b"));
        assert!(inner.state.snapshot().data.is_empty());
        assert!(!inner.state.snapshot().loaded);
        drop(inner);
        assert!(!watch.shared.apply(first_gen, Ok(Event::Apply(cutover("late")))));
    }

    #[tokio::test]
    async fn stop_clears_the_collection_and_aborts_the_task() {
        let watch = WatchTask::<Pipeline>::new();
        let (handle, alive) = placeholder();
        let mut current = 0;
        watch.restart("ns-a", |_, generation| {
            current = generation;
            handle
        });
        watch.shared.apply(current, Ok(Event::Init));
        watch.shared.apply(current, Ok(Event::InitApply(cutover("a"))));
        watch.shared.apply(current, Ok(Event::InitDone));
        let before = watch.shared.inner.read().state.snapshot();
        assert!(before.loaded);

        assert!(watch.stop());
        assert_aborted(alive).await;

        let inner = watch.shared.inner.read();
        let after = inner.state.snapshot();
        assert!(after.data.is_empty());
        assert!(!after.loaded);
        assert!(after.epoch > before.epoch);
        assert!(inner.namespace.is_none());
        assert!(inner.generation > current);
        drop(inner);

        assert!(!watch.stop());
    }

    #[tokio::test]
    async fn dropping_the_watch_aborts_the_task() {
        let watch = WatchTask::<Pipeline>::new();
        let (handle, alive) = placeholder();
        watch.restart("ns-a", |_, _| handle);

        drop(watch);
        assert_aborted(alive).await;
    }

    #[test]
    fn combined_groups_need_both_collections_loaded() {
        let mut pipelines = WatchState::default();
        pipelines.apply(Event::Init);
        pipelines.apply(Event::InitApply(cutover("app1")));
        pipelines.apply(Event::InitDone);

        let runs = WatchState::<PipelineRun>::default();
        let groups = combine(pipelines.snapshot(), runs.snapshot());
        assert!(!groups.loaded);
        assert_eq!(groups.groups.len(), 1);
        assert!(groups.find("app1").is_some());
        assert_eq!(groups.epoch, 3);
    }

    #[test]
    fn find_prefers_the_cutover_pipeline_name() {
        let mut pipelines = WatchState::default();
        pipelines.apply(Event::Init);
        pipelines.apply(Event::InitApply(cutover("app1-cutover")));
        pipelines.apply(Event::InitApply(pipeline(
            "app1-stage",
            "stage",
            Some("app1-cutover"),
            T1,
        )));
        pipelines.apply(Event::InitApply(pipeline("app1", "cutover", None, T2)));
        pipelines.apply(Event::InitDone);

        let runs = WatchState::<PipelineRun>::default();
        let groups = combine(pipelines.snapshot(), runs.snapshot());
        assert_eq!(groups.groups.len(), 2);
        assert_eq!(groups.find("app1").map(|g| g.name.as_str()), Some("app1"));
        assert_eq!(
            groups.find("app1-cutover").map(|g| g.name.as_str()),
            Some("app1-cutover")
        );
    }
}
