//! Main Store struct tying the log, index, ACLs and live feed together.

use crate::acl::{AccessChecker, AclAccessChecker, Operation, Principal, SystemSettings};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::live::{FeedScope, LiveBus, LiveFeed, LiveSubscription, SubscriptionConfirmation};
use crate::metadata::StreamMetadata;
use crate::reader::{HistoricalReader, ReadAllPage, ReadDirection, ReadOptions, ReadStreamPage};
use crate::records::{EventLog, PendingEvent, StreamIndex, StreamStatus};
use crate::streams;
use crate::types::{
    EventRecord, ExpectedRevision, NewEvent, Position, ResolvedEvent, StreamRevision, Timestamp,
};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Magic bytes for store manifest.
const STORE_MAGIC: &[u8; 4] = b"EVS\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// Event type used for writes to `$settings`.
pub const SETTINGS_EVENT_TYPE: &str = "$settings";

/// Metadata or ACL change caused by a system event.
enum SystemChange {
    Stream(String),
    Settings,
}

/// The event store.
///
/// Provides:
/// - Appends with optimistic concurrency
/// - Stream metadata, soft and hard deletes
/// - Ephemeral `$mem-` streams that keep only their latest event
/// - Historical reads, live subscriptions and ACL checks
pub struct Store {
    /// Store configuration.
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Event log.
    log: EventLog,

    /// Stream index.
    index: StreamIndex,

    /// ACL state, updated from metadata and settings writes.
    acl: AclAccessChecker,

    /// Live fan-out.
    live: Arc<LiveBus>,

    /// Latest event of each ephemeral stream. Never persisted.
    ephemeral: RwLock<HashMap<String, EventRecord>>,

    /// Serializes writes and live registration, so publish order is commit order.
    write_lock: Mutex<()>,
}

impl Store {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Create a new store.
    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let log = Self::open_log(&config)?;
        debug!(path = %config.path.display(), "created store");

        Ok(Self::assemble(config, lock_file, log))
    }

    /// Open an existing store, rebuilding the index from the log.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let log = Self::open_log(&config)?;
        let store = Self::assemble(config, lock_file, log);
        store.rebuild()?;
        debug!(
            path = %store.config.path.display(),
            events = store.index.event_count(),
            "opened store"
        );

        Ok(store)
    }

    fn open_log(config: &StoreConfig) -> Result<EventLog> {
        EventLog::open_with(
            config.path.join("events.log"),
            config.sync_interval,
            config.record_cache_size,
        )
    }

    fn assemble(config: StoreConfig, lock_file: File, log: EventLog) -> Self {
        let live = LiveBus::new(config.live_buffer_size);
        Self {
            config,
            _lock_file: lock_file,
            log,
            index: StreamIndex::new(),
            acl: AclAccessChecker::new(),
            live,
            ephemeral: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Re-index every record and re-apply metadata and settings.
    fn rebuild(&self) -> Result<()> {
        for result in self.log.iter() {
            let record = result?;
            self.index.add(&record);
            self.apply_system_event(&record);
        }
        Ok(())
    }

    // --- Writes ---

    /// Append events to a stream.
    pub fn append(
        &self,
        stream: &str,
        expected: ExpectedRevision,
        events: Vec<NewEvent>,
    ) -> Result<Vec<EventRecord>> {
        Self::validate_writable(stream)?;

        let _lock = self.write_lock.lock();
        let current = self.check_expected(stream, expected)?;

        let mut next = current.map(StreamRevision::next).unwrap_or(StreamRevision::START);
        let pending = events
            .into_iter()
            .map(|event| {
                let revision = next;
                next = next.next();
                PendingEvent {
                    stream_id: stream.to_string(),
                    revision,
                    event,
                }
            })
            .collect();

        self.write_batch(pending)
    }

    /// Replace a stream's metadata.
    pub fn set_stream_metadata(
        &self,
        stream: &str,
        metadata: &StreamMetadata,
    ) -> Result<EventRecord> {
        let metastream = streams::metastream_of(stream);
        let event = NewEvent::json(streams::METADATA_EVENT_TYPE, metadata)?;
        self.append(&metastream, ExpectedRevision::Any, vec![event])?
            .pop()
            .ok_or_else(|| StoreError::InvalidOperation("metadata write produced no event".into()))
    }

    /// Replace the default ACLs.
    pub fn set_system_settings(&self, settings: &SystemSettings) -> Result<EventRecord> {
        let event = NewEvent::json(SETTINGS_EVENT_TYPE, settings)?;
        self.append(streams::SETTINGS, ExpectedRevision::Any, vec![event])?
            .pop()
            .ok_or_else(|| StoreError::InvalidOperation("settings write produced no event".into()))
    }

    /// Delete a stream.
    ///
    /// A soft delete truncates everything written so far; the stream can be
    /// written again and keeps numbering revisions. A hard delete appends a
    /// tombstone and rejects all further writes.
    pub fn delete_stream(&self, stream: &str, expected: ExpectedRevision, hard: bool) -> Result<()> {
        Self::validate_writable(stream)?;

        let _lock = self.write_lock.lock();
        let current = self.check_expected(stream, expected)?;

        if hard {
            let tombstone = PendingEvent {
                stream_id: stream.to_string(),
                revision: StreamRevision::DELETED_STREAM,
                event: NewEvent::raw(streams::STREAM_DELETED_EVENT_TYPE, Vec::new()),
            };
            self.write_batch(vec![tombstone])?;
            debug!(stream, "hard deleted stream");
            return Ok(());
        }

        let last = current.ok_or_else(|| {
            StoreError::InvalidOperation(format!("cannot soft delete missing stream {}", stream))
        })?;
        let metadata = self.index.metadata(stream).with_truncate_before(last.0 + 1);

        let metastream = streams::metastream_of(stream);
        let meta_revision = self
            .index
            .last_revision(&metastream)
            .map(StreamRevision::next)
            .unwrap_or(StreamRevision::START);
        let pending = PendingEvent {
            stream_id: metastream,
            revision: meta_revision,
            event: NewEvent::json(streams::METADATA_EVENT_TYPE, &metadata)?,
        };
        self.write_batch(vec![pending])?;
        debug!(stream, truncate_before = last.0 + 1, "soft deleted stream");
        Ok(())
    }

    /// Replace the single event of an ephemeral `$mem-` stream.
    pub fn write_ephemeral(&self, stream: &str, event: NewEvent) -> Result<EventRecord> {
        if !streams::is_ephemeral(stream) {
            return Err(StoreError::InvalidStreamName(stream.to_string()));
        }

        let _lock = self.write_lock.lock();
        let mut ephemeral = self.ephemeral.write();
        let revision = ephemeral
            .get(stream)
            .map(|e| e.revision.next())
            .unwrap_or(StreamRevision::START);

        let record = EventRecord {
            stream_id: stream.to_string(),
            revision,
            event_id: event.event_id,
            event_type: event.event_type,
            data: event.data,
            metadata: event.metadata,
            is_json: event.is_json,
            position: None,
            created: Timestamp::now(),
        };
        ephemeral.insert(stream.to_string(), record.clone());
        drop(ephemeral);

        self.live
            .publish_event(&ResolvedEvent::new(record.clone()), true);
        Ok(record)
    }

    fn validate_writable(stream: &str) -> Result<()> {
        if stream.is_empty() || stream == streams::ALL {
            return Err(StoreError::InvalidStreamName(stream.to_string()));
        }
        if streams::is_ephemeral(stream) {
            return Err(StoreError::InvalidOperation(format!(
                "{} is ephemeral; use write_ephemeral",
                stream
            )));
        }
        Ok(())
    }

    /// Check the expected revision. Caller holds the write lock.
    fn check_expected(
        &self,
        stream: &str,
        expected: ExpectedRevision,
    ) -> Result<Option<StreamRevision>> {
        if self.index.is_deleted(stream) {
            return Err(StoreError::StreamDeleted(stream.to_string()));
        }

        let current = self.index.last_revision(stream);
        let ok = match expected {
            ExpectedRevision::Any => true,
            ExpectedRevision::NoStream => current.is_none(),
            ExpectedRevision::StreamExists => current.is_some(),
            ExpectedRevision::Exact(rev) => current == Some(rev),
        };
        if !ok {
            return Err(StoreError::WrongExpectedRevision {
                stream: stream.to_string(),
                expected: expected.to_string(),
                actual: current,
            });
        }
        Ok(current)
    }

    /// Write, index and publish a batch. Caller holds the write lock.
    fn write_batch(&self, pending: Vec<PendingEvent>) -> Result<Vec<EventRecord>> {
        let records = self.log.append_batch(pending)?;
        let now = Timestamp::now();

        for record in &records {
            self.index.add(record);
            let change = self.apply_system_event(record);

            let visible = self.index.is_visible(&record.stream_id, record.revision, now);
            trace!(
                stream = %record.stream_id,
                revision = %record.revision,
                position = ?record.position,
                "committed event"
            );
            self.live
                .publish_event(&ResolvedEvent::new(record.clone()), visible);

            match change {
                Some(SystemChange::Stream(stream)) => {
                    self.live.publish_metadata_changed(Some(&stream))
                }
                Some(SystemChange::Settings) => self.live.publish_metadata_changed(None),
                None => {}
            }
        }

        Ok(records)
    }

    /// Apply metadata and settings events to index and ACL state.
    fn apply_system_event(&self, record: &EventRecord) -> Option<SystemChange> {
        if record.stream_id == streams::SETTINGS {
            let settings = match serde_json::from_slice::<SystemSettings>(&record.data) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!(error = %e, "ignoring unparseable system settings");
                    SystemSettings::default()
                }
            };
            self.acl.set_settings(settings);
            return Some(SystemChange::Settings);
        }

        if record.event_type != streams::METADATA_EVENT_TYPE {
            return None;
        }
        let stream = streams::original_stream_of(&record.stream_id)?;
        let metadata = StreamMetadata::from_slice(stream, &record.data);
        self.acl.set_stream_acl(stream, metadata.acl.clone());
        self.index.set_metadata(stream, metadata);
        Some(SystemChange::Stream(stream.to_string()))
    }

    // --- Reads ---

    fn check_leader(&self, options: ReadOptions) -> Result<()> {
        if options.requires_leader && !self.config.is_leader {
            return Err(StoreError::NotLeader);
        }
        Ok(())
    }

    fn read_resolved(&self, position: Position, options: ReadOptions) -> Result<ResolvedEvent> {
        let record = self.log.read_at(position.prepare)?;
        self.resolve(record, options)
    }

    /// Latest event of an ephemeral stream.
    pub fn ephemeral_event(&self, stream: &str) -> Option<EventRecord> {
        self.ephemeral.read().get(stream).cloned()
    }

    // --- Accessors ---

    /// ACL state shared with this store.
    pub fn acl(&self) -> &AclAccessChecker {
        &self.acl
    }

    /// Live bus shared with this store.
    pub fn live(&self) -> &Arc<LiveBus> {
        &self.live
    }

    pub fn stream_metadata(&self, stream: &str) -> StreamMetadata {
        self.index.metadata(stream)
    }

    /// Last written revision of a stream, ignoring truncation.
    pub fn last_revision(&self, stream: &str) -> Option<StreamRevision> {
        self.index.last_revision(stream)
    }

    /// Position of the latest event in the log.
    pub fn last_position(&self) -> Option<Position> {
        self.index.last_position()
    }

    pub fn event_count(&self) -> usize {
        self.index.event_count()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Sync all data to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    /// Get the store path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // --- Private Helpers ---

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::create(manifest_path)?;

        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::open(manifest_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

impl HistoricalReader for Store {
    fn read_all(
        &self,
        from: Position,
        direction: ReadDirection,
        max_count: usize,
        options: ReadOptions,
    ) -> Result<ReadAllPage> {
        self.check_leader(options)?;

        let log_end = self.log.size();
        let valid = from.is_start()
            || from.is_end()
            || from.commit >= log_end
            || self.index.contains(from);
        if !valid {
            return Err(StoreError::InvalidPosition(from));
        }

        let tail = self.index.last_position();
        let end_of_log = Position::new(log_end, log_end);
        if max_count == 0 {
            return Ok(ReadAllPage {
                events: Vec::new(),
                next: from,
                is_end_of_stream: false,
                tail,
            });
        }

        let (mut positions, forwards) = match direction {
            ReadDirection::Forwards => (self.index.positions_forwards(from, max_count + 1), true),
            ReadDirection::Backwards => (self.index.positions_backwards(from, max_count + 1), false),
        };

        let has_more = positions.len() > max_count;
        let next = if forwards {
            if has_more {
                positions[max_count]
            } else {
                end_of_log
            }
        } else if has_more {
            positions[max_count - 1]
        } else {
            Position::START
        };
        positions.truncate(max_count);

        let events = positions
            .into_iter()
            .map(|p| self.read_resolved(p, options))
            .collect::<Result<Vec<_>>>()?;
        trace!(from = %from, ?direction, count = events.len(), "read $all page");

        Ok(ReadAllPage {
            events,
            next,
            is_end_of_stream: !has_more,
            tail,
        })
    }

    fn read_stream(
        &self,
        stream: &str,
        from: StreamRevision,
        direction: ReadDirection,
        max_count: usize,
        options: ReadOptions,
    ) -> Result<ReadStreamPage> {
        self.check_leader(options)?;

        if streams::is_ephemeral(stream) {
            let Some(latest) = self.ephemeral_event(stream) else {
                return Ok(ReadStreamPage {
                    events: Vec::new(),
                    next: StreamRevision::END,
                    is_end_of_stream: true,
                    last_revision: None,
                    status: StreamStatus::NoStream,
                });
            };
            let include = max_count > 0
                && match direction {
                    ReadDirection::Forwards => latest.revision >= from,
                    ReadDirection::Backwards => latest.revision <= from,
                };
            let last_revision = Some(latest.revision);
            let events = if include {
                vec![ResolvedEvent::new(latest)]
            } else {
                Vec::new()
            };
            return Ok(ReadStreamPage {
                events,
                next: StreamRevision::END,
                is_end_of_stream: true,
                last_revision,
                status: StreamStatus::Ok,
            });
        }

        let forwards = direction == ReadDirection::Forwards;
        let slice = self
            .index
            .read_stream(stream, from, forwards, max_count, Timestamp::now());

        let events = slice
            .entries
            .iter()
            .map(|(_, position)| self.read_resolved(*position, options))
            .collect::<Result<Vec<_>>>()?;
        trace!(stream, from = %from, ?direction, count = events.len(), status = ?slice.status, "read stream page");

        Ok(ReadStreamPage {
            events,
            next: slice.next,
            is_end_of_stream: slice.is_end_of_stream,
            last_revision: slice.last_revision,
            status: slice.status,
        })
    }

    fn resolve(&self, record: EventRecord, options: ReadOptions) -> Result<ResolvedEvent> {
        if !options.resolve_links {
            return Ok(ResolvedEvent::new(record));
        }
        let Some((stream, revision)) = record.link_target() else {
            return Ok(ResolvedEvent::new(record));
        };

        if !self.index.is_visible(&stream, revision, Timestamp::now()) {
            return Ok(ResolvedEvent::new(record));
        }
        match self.index.position_of(&stream, revision) {
            Some(position) => {
                let target = self.log.read_at(position.prepare)?;
                Ok(ResolvedEvent::resolved(target, record))
            }
            None => Ok(ResolvedEvent::new(record)),
        }
    }
}

impl LiveFeed for Store {
    fn subscribe(&self, scope: FeedScope) -> Result<(LiveSubscription, SubscriptionConfirmation)> {
        let _lock = self.write_lock.lock();

        let mut confirmation = SubscriptionConfirmation {
            last_position: self.index.last_position(),
            ..Default::default()
        };
        if let FeedScope::Stream(stream) = &scope {
            if streams::is_ephemeral(stream) {
                confirmation.last_revision = self.ephemeral_event(stream).map(|e| e.revision);
            } else {
                confirmation.last_revision = self.index.last_revision(stream);
                confirmation.stream_deleted = self.index.is_deleted(stream);
            }
        }

        let subscription = self.live.subscribe(scope);
        Ok((subscription, confirmation))
    }
}

impl AccessChecker for Store {
    fn check(&self, principal: &Principal, operation: &Operation) -> bool {
        self.acl.check(principal, operation)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::StreamAcl;
    use crate::records::FILE_HEADER_SIZE;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> StoreConfig {
        StoreConfig {
            path: dir.path().join("store"),
            ..Default::default()
        }
    }

    fn event(event_type: &str) -> NewEvent {
        NewEvent::json(event_type, &json!({"text": "hello"})).unwrap()
    }

    fn forwards() -> ReadOptions {
        ReadOptions::default()
    }

    #[test]
    fn test_create_store() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        assert!(store.path().join("MANIFEST").exists());
        assert!(store.path().join("events.log").exists());
        assert_eq!(store.last_position(), None);
    }

    #[test]
    fn test_store_lock() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let _store1 = Store::create(config.clone()).unwrap();

        // Second store should fail to acquire lock
        let result = Store::open(config);
        assert!(matches!(result, Err(StoreError::Locked)));
    }

    #[test]
    fn test_append_assigns_revisions() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        let records = store
            .append("orders", ExpectedRevision::NoStream, vec![event("a"), event("b")])
            .unwrap();
        assert_eq!(records[0].revision, StreamRevision(0));
        assert_eq!(records[1].revision, StreamRevision(1));
        assert_eq!(records[0].position.unwrap().commit, FILE_HEADER_SIZE);
        assert_eq!(
            records[0].position.unwrap().commit,
            records[1].position.unwrap().commit
        );

        let more = store
            .append("orders", ExpectedRevision::Exact(StreamRevision(1)), vec![event("c")])
            .unwrap();
        assert_eq!(more[0].revision, StreamRevision(2));
    }

    #[test]
    fn test_wrong_expected_revision() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        let result = store.append("orders", ExpectedRevision::StreamExists, vec![event("a")]);
        assert!(matches!(result, Err(StoreError::WrongExpectedRevision { .. })));

        store
            .append("orders", ExpectedRevision::Any, vec![event("a")])
            .unwrap();
        let result = store.append("orders", ExpectedRevision::NoStream, vec![event("b")]);
        assert!(matches!(
            result,
            Err(StoreError::WrongExpectedRevision {
                actual: Some(StreamRevision(0)),
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_reserved_streams() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        assert!(matches!(
            store.append("$all", ExpectedRevision::Any, vec![event("a")]),
            Err(StoreError::InvalidStreamName(_))
        ));
        assert!(matches!(
            store.append("$mem-node-state", ExpectedRevision::Any, vec![event("a")]),
            Err(StoreError::InvalidOperation(_))
        ));
        assert!(matches!(
            store.write_ephemeral("orders", event("a")),
            Err(StoreError::InvalidStreamName(_))
        ));
    }

    #[test]
    fn test_read_all_positions() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        for i in 0..5 {
            store
                .append(&format!("s-{}", i), ExpectedRevision::Any, vec![event("t")])
                .unwrap();
        }

        let page = store
            .read_all(Position::START, ReadDirection::Forwards, 3, forwards())
            .unwrap();
        assert_eq!(page.events.len(), 3);
        assert!(!page.is_end_of_stream);
        assert_eq!(page.tail, store.last_position());

        let rest = store
            .read_all(page.next, ReadDirection::Forwards, 3, forwards())
            .unwrap();
        assert_eq!(rest.events.len(), 2);
        assert!(rest.is_end_of_stream);

        let back = store
            .read_all(Position::END, ReadDirection::Backwards, 10, forwards())
            .unwrap();
        let streams: Vec<_> = back.events.iter().map(|e| e.event.stream_id.clone()).collect();
        assert_eq!(streams, vec!["s-4", "s-3", "s-2", "s-1", "s-0"]);
        assert!(back.is_end_of_stream);
    }

    #[test]
    fn test_read_all_invalid_position() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        store
            .append("orders", ExpectedRevision::Any, vec![event("a"), event("b")])
            .unwrap();
        let last = store.last_position().unwrap();

        let result = store.read_all(last.minus_bytes(1), ReadDirection::Forwards, 10, forwards());
        assert!(matches!(result, Err(StoreError::InvalidPosition(_))));

        let beyond = Position::new(store.log.size() + 10, store.log.size() + 10);
        let page = store
            .read_all(beyond, ReadDirection::Forwards, 10, forwards())
            .unwrap();
        assert!(page.events.is_empty());
        assert!(page.is_end_of_stream);
    }

    #[test]
    fn test_soft_delete_truncates_and_allows_recreate() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        store
            .append("orders", ExpectedRevision::Any, vec![event("a"), event("b")])
            .unwrap();
        store
            .delete_stream("orders", ExpectedRevision::Any, false)
            .unwrap();

        let page = store
            .read_stream("orders", StreamRevision::START, ReadDirection::Forwards, 10, forwards())
            .unwrap();
        assert_eq!(page.status, StreamStatus::NoStream);

        let records = store
            .append("orders", ExpectedRevision::Any, vec![event("c")])
            .unwrap();
        assert_eq!(records[0].revision, StreamRevision(2));

        let page = store
            .read_stream("orders", StreamRevision::START, ReadDirection::Forwards, 10, forwards())
            .unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].event.revision, StreamRevision(2));
    }

    #[test]
    fn test_hard_delete() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        store
            .append("orders", ExpectedRevision::Any, vec![event("a")])
            .unwrap();
        store
            .delete_stream("orders", ExpectedRevision::Any, true)
            .unwrap();

        let page = store
            .read_stream("orders", StreamRevision::START, ReadDirection::Forwards, 10, forwards())
            .unwrap();
        assert_eq!(page.status, StreamStatus::Deleted);
        assert_eq!(page.events.len(), 1);
        assert!(page.events[0].event.is_tombstone());

        let result = store.append("orders", ExpectedRevision::Any, vec![event("b")]);
        assert!(matches!(result, Err(StoreError::StreamDeleted(_))));
    }

    #[test]
    fn test_ephemeral_stream_keeps_latest() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        store.write_ephemeral("$mem-node-state", event("state")).unwrap();
        store.write_ephemeral("$mem-node-state", event("state")).unwrap();

        for from in [StreamRevision::START, StreamRevision(1)] {
            let page = store
                .read_stream("$mem-node-state", from, ReadDirection::Forwards, 10, forwards())
                .unwrap();
            assert_eq!(page.events.len(), 1);
            assert_eq!(page.events[0].event.revision, StreamRevision(1));
            assert_eq!(page.events[0].event.position, None);
        }

        let page = store
            .read_stream("$mem-node-state", StreamRevision(2), ReadDirection::Forwards, 10, forwards())
            .unwrap();
        assert!(page.events.is_empty());
    }

    #[test]
    fn test_link_resolution() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        store
            .append("order-1", ExpectedRevision::Any, vec![event("created")])
            .unwrap();
        store
            .append(
                "$ce-order",
                ExpectedRevision::Any,
                vec![
                    NewEvent::link_to("order-1", StreamRevision(0)),
                    NewEvent::link_to("order-1", StreamRevision(7)),
                ],
            )
            .unwrap();

        let resolving = ReadOptions {
            resolve_links: true,
            ..Default::default()
        };
        let page = store
            .read_stream("$ce-order", StreamRevision::START, ReadDirection::Forwards, 10, resolving)
            .unwrap();
        assert_eq!(page.events[0].event.stream_id, "order-1");
        assert!(page.events[0].link.is_some());
        assert_eq!(page.events[1].event.stream_id, "$ce-order");
        assert!(page.events[1].link.is_none());

        let raw = store
            .read_stream("$ce-order", StreamRevision::START, ReadDirection::Forwards, 10, forwards())
            .unwrap();
        assert!(raw.events[0].event.is_link());
    }

    #[test]
    fn test_requires_leader() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            is_leader: false,
            ..test_config(&dir)
        };
        let store = Store::create(config).unwrap();

        let options = ReadOptions {
            requires_leader: true,
            ..Default::default()
        };
        let result = store.read_all(Position::START, ReadDirection::Forwards, 10, options);
        assert!(matches!(result, Err(StoreError::NotLeader)));
        assert!(store
            .read_all(Position::START, ReadDirection::Forwards, 10, forwards())
            .is_ok());
    }

    #[test]
    fn test_metadata_updates_acl() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();
        let anon = Principal::anonymous();

        assert!(store.check(&anon, &Operation::read("orders")));
        store
            .set_stream_metadata(
                "orders",
                &StreamMetadata::default().with_acl(StreamAcl::readers(&[])),
            )
            .unwrap();
        assert!(!store.check(&anon, &Operation::read("orders")));
    }

    #[test]
    fn test_persistence_rebuilds_index_and_metadata() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        {
            let store = Store::create(config.clone()).unwrap();
            store
                .append("orders", ExpectedRevision::Any, vec![event("a"), event("b"), event("c")])
                .unwrap();
            store
                .set_stream_metadata("orders", &StreamMetadata::default().with_max_count(1))
                .unwrap();
            store
                .set_system_settings(&SystemSettings {
                    user_stream_acl: Some(StreamAcl::readers(&["$admins"])),
                    system_stream_acl: None,
                })
                .unwrap();
            store.sync().unwrap();
        }

        let store = Store::open(config).unwrap();
        assert_eq!(store.event_count(), 5);
        assert_eq!(store.last_revision("orders"), Some(StreamRevision(2)));
        assert_eq!(store.stream_metadata("orders").max_count, Some(1));
        assert!(!store.check(&Principal::anonymous(), &Operation::read("orders")));

        let page = store
            .read_stream("orders", StreamRevision::START, ReadDirection::Forwards, 10, forwards())
            .unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].event.revision, StreamRevision(2));
    }

    #[test]
    fn test_subscribe_snapshots_tail() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();
        store
            .append("orders", ExpectedRevision::Any, vec![event("a")])
            .unwrap();

        let (_sub, confirmation) = store
            .subscribe(FeedScope::Stream("orders".into()))
            .unwrap();
        assert_eq!(confirmation.last_revision, Some(StreamRevision(0)));
        assert_eq!(confirmation.last_position, store.last_position());
        assert!(!confirmation.stream_deleted);
        assert_eq!(store.live().subscriber_count(), 1);
    }
}
