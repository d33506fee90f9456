use std::fmt;
use std::sync::Arc;

use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::{Interceptor, LifecycleError};
use crate::http::{Request, Response};
use crate::network::{FetchError, Network};

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Installed,
    Activating,
    Activated,
    /// Failed to install or activate, or superseded by a newer worker
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// An interceptor together with its lifecycle state.
pub struct Worker {
    interceptor: Interceptor,
    state: watch::Sender<WorkerState>,
}

impl Worker {
    fn new(interceptor: Interceptor) -> Self {
        let (state, _) = watch::channel(WorkerState::Installing);
        Self { interceptor, state }
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: WorkerState) {
        debug!(cache = self.interceptor.cache_name(), state = %state, "Worker state changed");
        self.state.send_replace(state);
    }
}

/// Host runtime for interceptors.
///
/// Holds at most one active worker. Fetches go to the active worker, or
/// straight to the network when there is none.
pub struct Registration {
    network: Arc<dyn Network>,
    active: RwLock<Option<Arc<Worker>>>,
    /// Keeps concurrent registrations from interleaving their lifecycles
    lifecycle: Mutex<()>,
}

impl Registration {
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self {
            network,
            active: RwLock::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    /// Install and activate `interceptor`, then make it the active worker.
    ///
    /// On failure the new worker becomes redundant and the previously active
    /// worker, if any, stays in place.
    pub async fn register(&self, interceptor: Interceptor) -> Result<Arc<Worker>, LifecycleError> {
        let _guard = self.lifecycle.lock().await;
        let worker = Arc::new(Worker::new(interceptor));

        if let Err(e) = worker.interceptor.install().await {
            warn!(cache = worker.interceptor.cache_name(), error = %e, "Install failed");
            worker.set_state(WorkerState::Redundant);
            return Err(e.into());
        }
        worker.set_state(WorkerState::Installed);

        self.activate_worker(worker).await
    }

    /// Activate a worker whose cache was installed by an earlier process,
    /// without installing again.
    pub async fn restore(&self, interceptor: Interceptor) -> Result<Arc<Worker>, LifecycleError> {
        let _guard = self.lifecycle.lock().await;
        let cache_name = interceptor.cache_name().to_string();
        if !interceptor.storage().has(&cache_name).await? {
            return Err(LifecycleError::NotInstalled(cache_name));
        }

        let worker = Arc::new(Worker::new(interceptor));
        worker.set_state(WorkerState::Installed);
        self.activate_worker(worker).await
    }

    async fn activate_worker(&self, worker: Arc<Worker>) -> Result<Arc<Worker>, LifecycleError> {
        worker.set_state(WorkerState::Activating);
        if let Err(e) = worker.interceptor.activate().await {
            warn!(cache = worker.interceptor.cache_name(), error = %e, "Activate failed");
            worker.set_state(WorkerState::Redundant);
            return Err(e.into());
        }
        worker.set_state(WorkerState::Activated);

        let previous = self.active.write().await.replace(Arc::clone(&worker));
        if let Some(previous) = previous {
            previous.set_state(WorkerState::Redundant);
        }
        info!(cache = worker.interceptor.cache_name(), "Worker is now active");
        Ok(worker)
    }

    pub async fn active(&self) -> Option<Arc<Worker>> {
        self.active.read().await.clone()
    }

    pub async fn active_state(&self) -> Option<WorkerState> {
        self.active.read().await.as_ref().map(|w| w.state())
    }

    /// Wait for the active worker's background cache writes. Call before
    /// the runtime shuts down, or pending writes are lost.
    pub async fn settle(&self) {
        if let Some(worker) = self.active().await {
            worker.interceptor.settle().await;
        }
    }

    /// Dispatch a request to the active worker, or pass it through to the
    /// network when no worker is active.
    pub async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        let worker = self.active().await;
        match worker {
            Some(worker) => worker.interceptor.fetch(request).await,
            None => {
                debug!(url = %request.display_url(), "No active worker, passing through");
                self.network.fetch(&request).await
            }
        }
    }
}
