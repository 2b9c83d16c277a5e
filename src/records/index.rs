//! In-memory stream index, rebuilt from the log on open.

use crate::metadata::StreamMetadata;
use crate::types::{EventRecord, Position, StreamRevision, Timestamp};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// Location of one stream event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub position: Position,
    pub created: Timestamp,
}

#[derive(Debug, Default)]
struct StreamEntry {
    /// Regular events; the vector index is the revision.
    events: Vec<IndexEntry>,
    tombstone: Option<IndexEntry>,
}

/// Whether a stream read found anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamStatus {
    Ok,
    NoStream,
    Deleted,
}

/// Visible slice of a stream, as positions to fetch from the log.
#[derive(Clone, Debug)]
pub struct StreamSlice {
    pub entries: Vec<(StreamRevision, Position)>,
    /// Revision to continue from, in the read direction.
    pub next: StreamRevision,
    pub is_end_of_stream: bool,
    pub last_revision: Option<StreamRevision>,
    pub status: StreamStatus,
}

impl StreamSlice {
    fn empty(status: StreamStatus, last_revision: Option<StreamRevision>) -> Self {
        Self {
            entries: Vec::new(),
            next: StreamRevision::END,
            is_end_of_stream: true,
            last_revision,
            status,
        }
    }
}

/// Index of streams, metadata and log positions.
pub struct StreamIndex {
    /// Stream name -> events.
    streams: RwLock<HashMap<String, StreamEntry>>,

    /// Stream name -> current metadata.
    metadata: RwLock<HashMap<String, StreamMetadata>>,

    /// Every event position in the log.
    positions: RwLock<BTreeSet<Position>>,
}

impl Default for StreamIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamIndex {
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            metadata: RwLock::new(HashMap::new()),
            positions: RwLock::new(BTreeSet::new()),
        }
    }

    /// Add a committed event.
    pub fn add(&self, record: &EventRecord) {
        let Some(position) = record.position else {
            return;
        };
        let entry = IndexEntry {
            position,
            created: record.created,
        };

        {
            let mut streams = self.streams.write();
            let stream = streams.entry(record.stream_id.clone()).or_default();
            if record.is_tombstone() {
                stream.tombstone = Some(entry);
            } else {
                stream.events.push(entry);
            }
        }

        self.positions.write().insert(position);
    }

    pub fn set_metadata(&self, stream: &str, metadata: StreamMetadata) {
        self.metadata.write().insert(stream.to_string(), metadata);
    }

    pub fn metadata(&self, stream: &str) -> StreamMetadata {
        self.metadata.read().get(stream).cloned().unwrap_or_default()
    }

    /// Last written revision, ignoring truncation. `None` for unknown streams.
    pub fn last_revision(&self, stream: &str) -> Option<StreamRevision> {
        let streams = self.streams.read();
        let entry = streams.get(stream)?;
        if entry.tombstone.is_some() {
            return Some(StreamRevision::DELETED_STREAM);
        }
        entry
            .events
            .len()
            .checked_sub(1)
            .map(|last| StreamRevision(last as u64))
    }

    pub fn is_deleted(&self, stream: &str) -> bool {
        self.streams
            .read()
            .get(stream)
            .map(|s| s.tombstone.is_some())
            .unwrap_or(false)
    }

    /// Position of the latest event in the log.
    pub fn last_position(&self) -> Option<Position> {
        self.positions.read().iter().next_back().copied()
    }

    pub fn contains(&self, position: Position) -> bool {
        self.positions.read().contains(&position)
    }

    pub fn event_count(&self) -> usize {
        self.positions.read().len()
    }

    /// Up to `max` positions at or after `from`.
    pub fn positions_forwards(&self, from: Position, max: usize) -> Vec<Position> {
        self.positions.read().range(from..).take(max).copied().collect()
    }

    /// Up to `max` positions strictly before `from`, newest first.
    pub fn positions_backwards(&self, from: Position, max: usize) -> Vec<Position> {
        self.positions
            .read()
            .range(..from)
            .rev()
            .take(max)
            .copied()
            .collect()
    }

    /// Position of a regular event, ignoring truncation.
    pub fn position_of(&self, stream: &str, revision: StreamRevision) -> Option<Position> {
        let streams = self.streams.read();
        let entry = streams.get(stream)?;
        usize::try_from(revision.0)
            .ok()
            .and_then(|i| entry.events.get(i))
            .map(|e| e.position)
    }

    /// True if `revision` of `stream` is currently visible.
    pub fn is_visible(&self, stream: &str, revision: StreamRevision, now: Timestamp) -> bool {
        let streams = self.streams.read();
        let Some(entry) = streams.get(stream) else {
            return false;
        };
        if revision == StreamRevision::DELETED_STREAM && entry.tombstone.is_some() {
            return true;
        }
        let Some(event) = usize::try_from(revision.0).ok().and_then(|i| entry.events.get(i)) else {
            return false;
        };
        let last = entry.events.len().checked_sub(1).map(|l| StreamRevision(l as u64));
        self.metadata(stream)
            .is_visible(revision, event.created, last, now)
    }

    /// Visible events of `stream` starting at `from` (inclusive).
    pub fn read_stream(
        &self,
        stream: &str,
        from: StreamRevision,
        forwards: bool,
        max: usize,
        now: Timestamp,
    ) -> StreamSlice {
        let metadata = self.metadata(stream);
        let streams = self.streams.read();
        let Some(entry) = streams.get(stream) else {
            return StreamSlice::empty(StreamStatus::NoStream, None);
        };

        if let Some(tombstone) = entry.tombstone {
            let entries = if max > 0 {
                vec![(StreamRevision::DELETED_STREAM, tombstone.position)]
            } else {
                Vec::new()
            };
            return StreamSlice {
                entries,
                next: StreamRevision::END,
                is_end_of_stream: true,
                last_revision: Some(StreamRevision::DELETED_STREAM),
                status: StreamStatus::Deleted,
            };
        }

        let Some(last) = entry.events.len().checked_sub(1).map(|l| l as u64) else {
            return StreamSlice::empty(StreamStatus::NoStream, None);
        };
        let last_revision = Some(StreamRevision(last));
        let first_visible = metadata.first_visible_revision(last_revision).0;
        // Creation times never decrease along a stream, so expired events
        // form a prefix of the visible range.
        let first_visible = match usize::try_from(first_visible) {
            Ok(first) if first < entry.events.len() => {
                let expired = entry.events[first..]
                    .partition_point(|e| metadata.is_expired(e.created, now));
                (first + expired) as u64
            }
            _ => first_visible,
        };
        if first_visible > last {
            return StreamSlice::empty(StreamStatus::NoStream, last_revision);
        }

        let mut entries = Vec::new();
        if forwards {
            let start = from.0.max(first_visible);
            let mut rev = start;
            while rev <= last && entries.len() < max {
                entries.push((StreamRevision(rev), entry.events[rev as usize].position));
                rev += 1;
            }
            StreamSlice {
                entries,
                next: StreamRevision(rev),
                is_end_of_stream: rev > last,
                last_revision,
                status: StreamStatus::Ok,
            }
        } else {
            let start = from.0.min(last);
            let mut rev = start as i128;
            while rev >= first_visible as i128 && entries.len() < max {
                let r = rev as u64;
                entries.push((StreamRevision(r), entry.events[r as usize].position));
                rev -= 1;
            }
            let is_end = rev < first_visible as i128;
            StreamSlice {
                entries,
                next: if is_end {
                    StreamRevision::START
                } else {
                    StreamRevision(rev as u64)
                },
                is_end_of_stream: is_end,
                last_revision,
                status: StreamStatus::Ok,
            }
        }
    }
}
