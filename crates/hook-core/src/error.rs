use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::delivery::RequestState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("Invalid {field} '{value}': {reason}")]
    Config {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("Failed to serialize payload: {reason}")]
    Serialization { reason: String },
    #[error("Transport error at {stage}: {reason}")]
    Transport { stage: RequestState, reason: String },
    #[error("Timed out at {stage}")]
    Timeout { stage: RequestState },
    #[error("Invalid request state transition {from} -> {to}")]
    InvalidTransition {
        from: RequestState,
        to: RequestState,
    },
}

impl NotifyError {
    pub fn config(field: &'static str, value: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Config {
            field,
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    pub fn transport(stage: RequestState, reason: impl fmt::Display) -> Self {
        Self::Transport {
            stage,
            reason: reason.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for NotifyError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            reason: e.to_string(),
        }
    }
}

/// A delivery that ended in [`RequestState::Failed`], or never got a handle.
///
/// `request_id` is `None` when the message was dropped before a handle was
/// registered (serialization or proxy parsing failed).
#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    pub request_id: Option<Uuid>,
    pub stage: RequestState,
    pub error: NotifyError,
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.request_id {
            Some(id) => write!(f, "request {} failed at {}: {}", id, self.stage, self.error),
            None => write!(f, "message dropped at {}: {}", self.stage, self.error),
        }
    }
}

/// Optional diagnostic side channel for failed deliveries.
pub type FailureHook = Arc<dyn Fn(&DeliveryFailure) + Send + Sync>;
