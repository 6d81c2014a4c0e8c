use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Notify;
use uuid::Uuid;

use super::handle::RequestHandle;
use super::state::RequestState;
use crate::error::NotifyError;

/// Concurrent registry of in-flight requests.
///
/// A request stays registered from submission until its first terminal
/// transition. Callers never hold a lock; insertion and removal can happen
/// from any worker thread.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    requests: DashMap<Uuid, Arc<RequestHandle>>,
    idle: Notify,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a freshly created handle (`Created -> Registered`).
    pub fn register(&self, handle: Arc<RequestHandle>) -> Result<(), NotifyError> {
        handle.advance(RequestState::Registered)?;
        self.inner.requests.insert(handle.id(), handle);
        Ok(())
    }

    /// Remove a handle. Removing an id that is not registered is a no-op
    /// and returns `None`.
    pub fn deregister(&self, id: &Uuid) -> Option<Arc<RequestHandle>> {
        let removed = self.inner.requests.remove(id).map(|(_, handle)| handle);
        if removed.is_some() && self.inner.requests.is_empty() {
            self.inner.idle.notify_waiters();
        }
        removed
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<RequestHandle>> {
        self.inner.requests.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.inner.requests.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.requests.is_empty()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.inner.requests.iter().map(|entry| *entry.key()).collect()
    }

    /// Resolve once no request is registered.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}
