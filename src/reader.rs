//! Historical reads: the storage side of catch-up.

use crate::error::Result;
use crate::records::StreamStatus;
use crate::types::{EventRecord, Position, ResolvedEvent, StreamRevision};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadDirection {
    Forwards,
    Backwards,
}

/// Per-read flags passed through to storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub resolve_links: bool,
    pub requires_leader: bool,
}

/// One page of `$all`.
#[derive(Clone, Debug)]
pub struct ReadAllPage {
    pub events: Vec<ResolvedEvent>,
    /// Where the next page starts, in the read direction.
    pub next: Position,
    pub is_end_of_stream: bool,
    /// Position of the latest event in the log at read time.
    pub tail: Option<Position>,
}

/// One page of a single stream.
#[derive(Clone, Debug)]
pub struct ReadStreamPage {
    pub events: Vec<ResolvedEvent>,
    pub next: StreamRevision,
    pub is_end_of_stream: bool,
    pub last_revision: Option<StreamRevision>,
    pub status: StreamStatus,
}

/// Paginated reads over durable storage.
///
/// Forward reads include `from`; backward reads of `$all` exclude it and
/// backward stream reads include it. Pages never go out of commit order.
pub trait HistoricalReader: Send + Sync {
    /// Read `$all`. Fails with [`crate::StoreError::InvalidPosition`] when
    /// `from` is not a boundary of the log.
    fn read_all(
        &self,
        from: Position,
        direction: ReadDirection,
        max_count: usize,
        options: ReadOptions,
    ) -> Result<ReadAllPage>;

    fn read_stream(
        &self,
        stream: &str,
        from: StreamRevision,
        direction: ReadDirection,
        max_count: usize,
        options: ReadOptions,
    ) -> Result<ReadStreamPage>;

    /// Resolve a link record to its target when `options.resolve_links` is
    /// set. Records that are not links, or whose target is gone, are
    /// returned unresolved.
    fn resolve(&self, record: EventRecord, options: ReadOptions) -> Result<ResolvedEvent>;
}
