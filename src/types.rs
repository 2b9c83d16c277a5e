//! Core types for the event store.

use crate::streams;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Coordinate in the global log: the commit offset of the batch that wrote
/// an event and the event's own prepare offset.
///
/// Ordering is lexicographic on `(commit, prepare)`, so
/// `START < any real position < END`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Position {
    pub commit: u64,
    pub prepare: u64,
}

impl Position {
    /// Before every event in the log.
    pub const START: Position = Position {
        commit: 0,
        prepare: 0,
    };

    /// After every event in the log, including ones not yet written.
    pub const END: Position = Position {
        commit: u64::MAX,
        prepare: u64::MAX,
    };

    pub fn new(commit: u64, prepare: u64) -> Self {
        Self { commit, prepare }
    }

    pub fn is_start(&self) -> bool {
        *self == Self::START
    }

    pub fn is_end(&self) -> bool {
        *self == Self::END
    }

    /// Shift both coordinates forward. Saturates instead of wrapping.
    pub fn plus_bytes(self, bytes: u64) -> Self {
        Self {
            commit: self.commit.saturating_add(bytes),
            prepare: self.prepare.saturating_add(bytes),
        }
    }

    /// Shift both coordinates backward. Saturates at zero.
    pub fn minus_bytes(self, bytes: u64) -> Self {
        Self {
            commit: self.commit.saturating_sub(bytes),
            prepare: self.prepare.saturating_sub(bytes),
        }
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_end() {
            write!(f, "Position(End)")
        } else {
            write!(f, "Position({}/{})", self.commit, self.prepare)
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_end() {
            write!(f, "End")
        } else {
            write!(f, "C:{}/P:{}", self.commit, self.prepare)
        }
    }
}

/// Sequence number of an event within its stream.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct StreamRevision(pub u64);

impl StreamRevision {
    pub const START: StreamRevision = StreamRevision(0);
    pub const END: StreamRevision = StreamRevision(u64::MAX);

    /// Revision carried by the tombstone of a hard-deleted stream.
    pub const DELETED_STREAM: StreamRevision = StreamRevision(i64::MAX as u64);

    pub fn is_start(&self) -> bool {
        *self == Self::START
    }

    pub fn is_end(&self) -> bool {
        *self == Self::END
    }

    pub fn next(self) -> Self {
        StreamRevision(self.0.saturating_add(1))
    }

    pub fn prev(self) -> Option<Self> {
        if self.0 > 0 {
            Some(StreamRevision(self.0 - 1))
        } else {
            None
        }
    }
}

impl fmt::Debug for StreamRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_end() {
            write!(f, "Rev(End)")
        } else {
            write!(f, "Rev({})", self.0)
        }
    }
}

impl fmt::Display for StreamRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }

    /// Whole seconds elapsed between `self` and `later`.
    pub fn seconds_until(&self, later: Timestamp) -> i64 {
        (later.0 - self.0) / 1_000_000
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// An event as stored in a stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub stream_id: String,
    pub revision: StreamRevision,
    pub event_id: Uuid,
    pub event_type: String,
    pub data: Vec<u8>,
    pub metadata: Vec<u8>,
    pub is_json: bool,
    /// `None` for events of ephemeral streams, which never reach the log.
    pub position: Option<Position>,
    pub created: Timestamp,
}

impl EventRecord {
    /// True for link events (`$>`), whose data is `"<revision>@<stream>"`.
    pub fn is_link(&self) -> bool {
        self.event_type == streams::LINK_EVENT_TYPE
    }

    /// True for the tombstone written by a hard delete.
    pub fn is_tombstone(&self) -> bool {
        self.event_type == streams::STREAM_DELETED_EVENT_TYPE
            && self.revision == StreamRevision::DELETED_STREAM
    }

    /// Target of a link event, if the data parses.
    pub fn link_target(&self) -> Option<(String, StreamRevision)> {
        if !self.is_link() {
            return None;
        }
        let text = std::str::from_utf8(&self.data).ok()?;
        let (revision, stream) = text.split_once('@')?;
        let revision = revision.trim().parse::<u64>().ok()?;
        if stream.is_empty() {
            return None;
        }
        Some((stream.to_string(), StreamRevision(revision)))
    }
}

/// An event as delivered to a reader or subscriber.
///
/// When `link` is set, `event` is the link's target and `link` the pointer
/// that was actually read. An unresolvable link is delivered as `event`
/// with `link == None`.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedEvent {
    pub event: EventRecord,
    pub link: Option<EventRecord>,
}

impl ResolvedEvent {
    pub fn new(event: EventRecord) -> Self {
        Self { event, link: None }
    }

    pub fn resolved(event: EventRecord, link: EventRecord) -> Self {
        Self {
            event,
            link: Some(link),
        }
    }

    /// The record that was read from the stream or log.
    pub fn original_event(&self) -> &EventRecord {
        self.link.as_ref().unwrap_or(&self.event)
    }

    pub fn original_position(&self) -> Option<Position> {
        self.original_event().position
    }

    pub fn original_stream_id(&self) -> &str {
        &self.original_event().stream_id
    }

    pub fn original_revision(&self) -> StreamRevision {
        self.original_event().revision
    }
}

/// Input for appending an event (before revision and position are assigned).
#[derive(Clone, Debug)]
pub struct NewEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub data: Vec<u8>,
    pub metadata: Vec<u8>,
    pub is_json: bool,
}

impl NewEvent {
    /// Create a new event with a JSON payload.
    pub fn json(
        event_type: impl Into<String>,
        payload: &impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            data: serde_json::to_vec(payload)?,
            metadata: Vec::new(),
            is_json: true,
        })
    }

    /// Create a new event with raw bytes.
    pub fn raw(event_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            data,
            metadata: Vec::new(),
            is_json: false,
        }
    }

    /// Create a link event pointing at `revision` of `stream`.
    pub fn link_to(stream: &str, revision: StreamRevision) -> Self {
        Self::raw(
            streams::LINK_EVENT_TYPE,
            format!("{}@{}", revision.0, stream).into_bytes(),
        )
    }

    pub fn with_metadata(mut self, metadata: Vec<u8>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_id(mut self, event_id: Uuid) -> Self {
        self.event_id = event_id;
        self
    }
}

/// Optimistic concurrency check for appends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpectedRevision {
    Any,
    NoStream,
    StreamExists,
    Exact(StreamRevision),
}

impl fmt::Display for ExpectedRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedRevision::Any => write!(f, "any"),
            ExpectedRevision::NoStream => write!(f, "no stream"),
            ExpectedRevision::StreamExists => write!(f, "stream exists"),
            ExpectedRevision::Exact(rev) => write!(f, "{}", rev),
        }
    }
}
