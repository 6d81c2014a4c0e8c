use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use url::Url;
use uuid::Uuid;

use super::state::RequestState;
use crate::error::NotifyError;

/// One in-flight webhook POST.
///
/// Everything the transport needs is captured at submission time, so later
/// configuration changes never affect a request already on its way.
#[derive(Debug)]
pub struct RequestHandle {
    id: Uuid,
    endpoint: Url,
    proxy: Option<Url>,
    body: Vec<u8>,
    created_at: DateTime<Utc>,
    state: Mutex<RequestState>,
}

impl RequestHandle {
    pub fn new(endpoint: Url, proxy: Option<Url>, body: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint,
            proxy,
            body,
            created_at: Utc::now(),
            state: Mutex::new(RequestState::Created),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn proxy(&self) -> Option<&Url> {
        self.proxy.as_ref()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.created_at).num_milliseconds()
    }

    pub fn state(&self) -> RequestState {
        *self.lock_state()
    }

    /// Move one step along the non-terminal path.
    pub fn advance(&self, next: RequestState) -> Result<(), NotifyError> {
        let mut state = self.lock_state();
        if !state.can_transition_to(next) {
            return Err(NotifyError::InvalidTransition {
                from: *state,
                to: next,
            });
        }
        *state = next;
        Ok(())
    }

    /// Enter `Completed`. Returns false if the handle was already terminal
    /// or had not reached `AwaitingResponse`.
    pub fn complete(&self) -> bool {
        self.advance(RequestState::Completed).is_ok()
    }

    /// Enter `Failed`, returning the state it failed from. `None` means the
    /// handle was already terminal and nothing changed.
    pub fn fail(&self) -> Option<RequestState> {
        let mut state = self.lock_state();
        if state.is_terminal() {
            return None;
        }
        let from = *state;
        *state = RequestState::Failed;
        Some(from)
    }

    fn lock_state(&self) -> MutexGuard<'_, RequestState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
