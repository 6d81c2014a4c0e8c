use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a single webhook POST.
///
/// `Completed` and `Failed` are terminal. `Failed` can be entered from any
/// non-terminal state; every other transition moves exactly one step forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Created,
    Registered,
    StreamOpen,
    BodyWritten,
    AwaitingResponse,
    Completed,
    Failed,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed)
    }

    pub fn can_transition_to(self, target: RequestState) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, target),
            (RequestState::Created, RequestState::Registered)
                | (RequestState::Registered, RequestState::StreamOpen)
                | (RequestState::StreamOpen, RequestState::BodyWritten)
                | (RequestState::BodyWritten, RequestState::AwaitingResponse)
                | (RequestState::AwaitingResponse, RequestState::Completed)
                | (_, RequestState::Failed)
        )
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Registered => write!(f, "registered"),
            Self::StreamOpen => write!(f, "stream_open"),
            Self::BodyWritten => write!(f, "body_written"),
            Self::AwaitingResponse => write!(f, "awaiting_response"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
