//! Live feed message types.

use crate::types::{Position, ResolvedEvent, StreamRevision};
use std::fmt;

/// Unique identifier for a live subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LiveSubscriptionId(pub u64);

impl fmt::Debug for LiveSubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LiveSub({})", self.0)
    }
}

/// What a live subscription listens to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedScope {
    /// Every event written to the log.
    All,
    /// Visible events of one stream plus metadata changes affecting it.
    Stream(String),
}

/// A notification payload.
#[derive(Clone, Debug)]
pub enum LiveMessage {
    Event(ResolvedEvent),
    /// Metadata or ACLs changed. `None` means the default ACLs in `$settings`.
    MetadataChanged { stream: Option<String> },
}

/// A message stamped with a per-subscriber sequence number.
///
/// Sequence numbers start at zero and increase by one per message; a gap
/// means older messages were evicted.
#[derive(Clone, Debug)]
pub struct Notification {
    pub sequence: u64,
    pub message: LiveMessage,
}

/// Tail of the log observed atomically with registration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionConfirmation {
    /// Position of the latest event in the log.
    pub last_position: Option<Position>,
    /// Latest revision of the subscribed stream, if stream-scoped.
    pub last_revision: Option<StreamRevision>,
    pub stream_deleted: bool,
}

/// Outcome of waiting for the next live message.
#[derive(Clone, Debug)]
pub enum LiveRecv {
    /// `missed` is set when messages before this one were evicted.
    Message { message: LiveMessage, missed: bool },
    Cancelled,
    Closed,
}
