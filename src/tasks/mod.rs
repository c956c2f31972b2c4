//! Delayed fire-and-forget tasks.
//!
//! Spawned tokio tasks are only kept alive by their join handles here; the
//! registry retains each handle from scheduling until the task finishes, then
//! drops it, so in-flight work is never abandoned and finished work never
//! accumulates. No cancellation surface: once scheduled, an action runs to
//! completion, and failures are logged rather than surfaced to any caller.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Opaque identifier of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    running: HashMap<u64, JoinHandle<()>>,
    // Tasks that finished before schedule() could file their handle.
    finished_early: HashSet<u64>,
}

/// Registry of delayed background tasks.
///
/// Owned by the application's composition root; its lifetime bounds the
/// lifetime of everything scheduled through it.
#[derive(Default)]
pub struct DelayedTaskRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

struct Deregister {
    inner: Arc<Mutex<RegistryInner>>,
    id: u64,
}

impl Drop for Deregister {
    // Runs on success and on panic unwind alike, mirroring a done-callback.
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if inner.running.remove(&self.id).is_none() {
            inner.finished_early.insert(self.id);
        }
    }
}

impl DelayedTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay` on a spawned task.
    ///
    /// The registry holds the join handle until the action completes; the
    /// scheduled work itself is fire-and-forget.
    pub fn schedule<F, Fut>(&self, name: &str, delay: Duration, action: F) -> TaskId
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = {
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            inner.next_id
        };

        let guard = Deregister {
            inner: Arc::clone(&self.inner),
            id,
        };
        let handle = tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep(delay).await;
            action().await;
        });
        debug!(task = name, delay_secs = delay.as_secs_f64(), "delayed task scheduled");

        let mut inner = self.inner.lock();
        if !inner.finished_early.remove(&id) {
            inner.running.insert(id, handle);
        }
        TaskId(id)
    }

    /// Number of scheduled tasks that have not finished yet.
    pub fn len(&self) -> usize {
        self.inner.lock().running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().running.is_empty()
    }

    /// Await everything still in flight. Called once at shutdown.
    pub async fn drain(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut inner = self.inner.lock();
                inner.running.drain().map(|(_, h)| h).collect()
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        error!(error = %e, "delayed task panicked");
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for DelayedTaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedTaskRegistry")
            .field("running", &self.len())
            .finish()
    }
}
