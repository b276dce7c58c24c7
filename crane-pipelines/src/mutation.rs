//! In-flight state of a remote mutation.
//!
//! A [`Mutation`] records whether an operation is idle, running, finished or
//! failed so callers can derive affordances (spinners, disabled actions)
//! from it while the watch stream catches up.

use crate::error::{CraneError, CraneResult};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;

/// Lifecycle of one mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MutationState<T> {
    /// Never submitted, or reset.
    #[default]
    Idle,
    /// Submitted and awaiting the API server.
    Loading,
    /// Completed; holds the operation's result.
    Success(T),
    /// Failed; holds the error message.
    Error(String),
}

impl<T> MutationState<T> {
    /// Whether the mutation is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Whether the mutation completed.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether the mutation has never run or was reset.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Result of a completed mutation.
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Error message of a failed mutation.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Shared tracker for one kind of mutation.
///
/// Cloning shares the underlying state. There is no retry and no
/// cancellation: the operation runs on its own task, so dropping the future
/// returned by [`Mutation::run`] only discards interest in the result.
#[derive(Debug)]
pub struct Mutation<T> {
    state: Arc<RwLock<MutationState<T>>>,
}

impl<T> Clone for Mutation<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Default for Mutation<T> {
    fn default() -> Self {
        Self {
            state: Arc::new(RwLock::new(MutationState::Idle)),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Mutation<T> {
    /// Create an idle mutation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> MutationState<T> {
        self.state.read().clone()
    }

    /// Return to [`MutationState::Idle`].
    pub fn reset(&self) {
        *self.state.write() = MutationState::Idle;
    }

    /// Drive an operation, recording its progress.
    ///
    /// The operation is spawned and records its own outcome, so it completes
    /// even when the returned future is dropped. The error is both stored in
    /// the state and returned.
    pub async fn run<F>(&self, operation: F) -> CraneResult<T>
    where
        F: Future<Output = CraneResult<T>> + Send + 'static,
    {
        *self.state.write() = MutationState::Loading;

        let state = Arc::clone(&self.state);
        let task = tokio::spawn(async move {
            let result = operation.await;
            *state.write() = match &result {
                Ok(data) => MutationState::Success(data.clone()),
                Err(e) => MutationState::Error(e.to_string()),
            };
            result
        });

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(CraneError::Cancelled(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn records_success() {
        let mutation = Mutation::<u32>::new();
        assert!(mutation.state().is_idle());

        let value = mutation.run(async { Ok(7) }).await.expect("mutation failed");

        assert_eq!(value, 7);
        assert_eq!(mutation.state().data(), Some(&7));

        mutation.reset();
        assert!(mutation.state().is_idle());
    }

    #[tokio::test]
    async fn records_error_and_returns_it() {
        let mutation = Mutation::<u32>::new();
        let result = mutation
            .run(async { Err(CraneError::InvalidResources("boom".into())) })
            .await;

        assert!(result.is_err());
        assert!(
            mutation
                .state()
                .error()
                .is_some_and(|message| message.contains("boom"))
        );
    }

    #[tokio::test]
    async fn loading_is_visible_while_in_flight() {
        let mutation = Mutation::<()>::new();
        let observer = mutation.clone();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let pending = mutation.run(async move {
            rx.await.ok();
            Ok(())
        });
        tokio::pin!(pending);

        // Poll once so the state flips to Loading.
        assert!(futures::poll!(pending.as_mut()).is_pending());
        assert!(observer.state().is_loading());

        tx.send(()).expect("receiver dropped");
        pending.await.expect("mutation failed");
        assert!(observer.state().is_success());
    }

    #[tokio::test]
    async fn dropped_caller_does_not_cancel_the_operation() {
        let mutation = Mutation::<()>::new();
        let observer = mutation.clone();
        let done = Arc::new(AtomicBool::new(false));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let flag = Arc::clone(&done);
        let mut pending = Box::pin(mutation.run(async move {
            rx.await.ok();
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }));
        assert!(futures::poll!(pending.as_mut()).is_pending());
        drop(pending);
        assert!(observer.state().is_loading());

        tx.send(()).expect("operation task dropped");
        tokio::time::timeout(Duration::from_secs(5), async {
            while observer.state().is_loading() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("operation did not finish");

        assert!(done.load(Ordering::SeqCst));
        assert!(observer.state().is_success());
    }
}
