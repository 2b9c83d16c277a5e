//! Responses emitted by enumerators.

use crate::types::{Position, ResolvedEvent};
use thiserror::Error;

/// Why an enumerator stopped.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("invalid position")]
    InvalidPosition,

    #[error("access denied")]
    AccessDenied,

    #[error("stream {stream} deleted")]
    StreamDeleted { stream: String },

    #[error("stream {stream} not found")]
    StreamNotFound { stream: String },
}

/// One item of an enumerator's output.
#[derive(Clone, Debug)]
pub enum ReadResponse {
    SubscriptionConfirmed { subscription_id: String },
    Event(ResolvedEvent),
    /// Every event up to and including this position has been scanned.
    Checkpoint(Position),
    FellBehind,
    CaughtUp,
    Failed(FailureReason),
    /// End of a one-shot read.
    Done,
}

impl ReadResponse {
    /// True for responses after which nothing else is emitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadResponse::Failed(_) | ReadResponse::Done)
    }

    pub fn as_event(&self) -> Option<&ResolvedEvent> {
        match self {
            ReadResponse::Event(e) => Some(e),
            _ => None,
        }
    }
}
