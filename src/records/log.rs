//! Append-only event log.
//!
//! Layout: an 8-byte file header followed by records. Each record is
//! `magic | version | flags | body length (u32) | body | crc32(body)`, with
//! the body encoded as MessagePack. A record's offset is its prepare
//! position; the offset of the first record of its append batch is its
//! commit position.

use crate::error::{Result, StoreError};
use crate::types::{EventRecord, NewEvent, Position, StreamRevision, Timestamp};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Magic bytes of the file header.
const FILE_MAGIC: &[u8; 4] = b"EVL\0";

/// Magic bytes of each record.
const RECORD_MAGIC: &[u8; 4] = b"EVT\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// Size of the file header: magic + version + 3 reserved bytes.
pub const FILE_HEADER_SIZE: u64 = 8;

/// Fixed part before the body: magic + version + flags + body length.
const RECORD_PREFIX_SIZE: usize = 4 + 1 + 1 + 4;

/// Trailing checksum size.
const RECORD_SUFFIX_SIZE: usize = 4;

/// On-disk body of an event record.
#[derive(Serialize, Deserialize)]
struct StoredEvent {
    stream_id: String,
    revision: u64,
    event_id: Uuid,
    event_type: String,
    data: Vec<u8>,
    metadata: Vec<u8>,
    is_json: bool,
    commit: u64,
    created: i64,
}

/// An event waiting to be written at a known stream revision.
pub struct PendingEvent {
    pub stream_id: String,
    pub revision: StreamRevision,
    pub event: NewEvent,
}

/// Append-only event log.
pub struct EventLog {
    /// Path to the log file.
    path: PathBuf,

    /// Log file handle.
    file: RwLock<File>,

    /// Current file size; the next record is written here.
    file_size: RwLock<u64>,

    /// Recently read records by offset.
    cache: Mutex<LruCache<u64, EventRecord>>,

    /// Number of batch writes since last sync.
    writes_since_sync: Mutex<u64>,

    /// Sync every N batch writes.
    sync_interval: u64,
}

impl EventLog {
    /// Default sync interval - sync every 100 writes for balance of durability and performance.
    pub const DEFAULT_SYNC_INTERVAL: u64 = 100;

    /// Open or create an event log with the default sync interval and cache size.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, Self::DEFAULT_SYNC_INTERVAL, 1024)
    }

    /// Open or create an event log.
    /// - sync_interval = 0 or 1: sync every write
    /// - sync_interval = 100: sync every 100 writes
    pub fn open_with(path: impl AsRef<Path>, sync_interval: u64, cache_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let mut file_size = file.metadata()?.len();
        if file_size == 0 {
            file.write_all(FILE_MAGIC)?;
            file.write_all(&[LOG_VERSION, 0, 0, 0])?;
            file.sync_all()?;
            file_size = FILE_HEADER_SIZE;
        } else {
            Self::verify_header(&mut file)?;
        }

        let cache_size = NonZeroUsize::new(cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            path,
            file: RwLock::new(file),
            file_size: RwLock::new(file_size),
            cache: Mutex::new(LruCache::new(cache_size)),
            writes_since_sync: Mutex::new(0),
            sync_interval: sync_interval.max(1),
        })
    }

    fn verify_header(file: &mut File) -> Result<()> {
        file.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; FILE_HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        if &header[0..4] != FILE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid event log magic".into()));
        }
        if header[4] != LOG_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported log version: {}",
                header[4]
            )));
        }
        Ok(())
    }

    /// Append a batch of events as one commit.
    ///
    /// All returned records share the commit position (the offset of the
    /// first record); each record's prepare position is its own offset.
    pub fn append_batch(&self, events: Vec<PendingEvent>) -> Result<Vec<EventRecord>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut file = self.file.write();
        let commit = *self.file_size.read();
        let created = Timestamp::now();

        let mut buffer = Vec::new();
        let mut records = Vec::with_capacity(events.len());
        for pending in events {
            let prepare = commit + buffer.len() as u64;
            let stored = StoredEvent {
                stream_id: pending.stream_id,
                revision: pending.revision.0,
                event_id: pending.event.event_id,
                event_type: pending.event.event_type,
                data: pending.event.data,
                metadata: pending.event.metadata,
                is_json: pending.event.is_json,
                commit,
                created: created.0,
            };
            Self::encode_record(&mut buffer, &stored)?;
            records.push(Self::into_record(stored, prepare));
        }

        file.seek(SeekFrom::Start(commit))?;
        file.write_all(&buffer)?;
        *self.file_size.write() = commit + buffer.len() as u64;

        // Sync periodically based on sync_interval
        let mut writes = self.writes_since_sync.lock();
        *writes += 1;
        if *writes >= self.sync_interval {
            file.sync_all()?;
            *writes = 0;
        }

        Ok(records)
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.write();
        file.sync_all()?;
        *self.writes_since_sync.lock() = 0;
        Ok(())
    }

    /// Read the record starting at `offset`.
    pub fn read_at(&self, offset: u64) -> Result<EventRecord> {
        if let Some(record) = self.cache.lock().get(&offset) {
            return Ok(record.clone());
        }

        let (record, _) = self.read_uncached(offset)?;
        self.cache.lock().put(offset, record.clone());
        Ok(record)
    }

    fn read_uncached(&self, offset: u64) -> Result<(EventRecord, u64)> {
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        let (stored, len) = Self::decode_record(&mut *file)?;
        Ok((Self::into_record(stored, offset), offset + len))
    }

    /// Iterate all records from the first one.
    pub fn iter(&self) -> EventIterator<'_> {
        EventIterator {
            log: self,
            offset: FILE_HEADER_SIZE,
            end: self.size(),
        }
    }

    /// Offset one past the last record.
    pub fn size(&self) -> u64 {
        *self.file_size.read()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode_record(buffer: &mut Vec<u8>, stored: &StoredEvent) -> Result<()> {
        let body = rmp_serde::to_vec(stored)?;
        let body_len = u32::try_from(body.len())
            .map_err(|_| StoreError::InvalidOperation("event too large".into()))?;

        buffer.extend_from_slice(RECORD_MAGIC);
        buffer.push(LOG_VERSION);
        buffer.push(0u8);
        buffer.extend_from_slice(&body_len.to_le_bytes());
        buffer.extend_from_slice(&body);
        buffer.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        Ok(())
    }

    /// Decode a record at the reader's position, returning it and its length.
    fn decode_record(reader: &mut impl Read) -> Result<(StoredEvent, u64)> {
        let mut prefix = [0u8; RECORD_PREFIX_SIZE];
        reader.read_exact(&mut prefix)?;

        if &prefix[0..4] != RECORD_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid record magic".into()));
        }
        if prefix[4] != LOG_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported record version: {}",
                prefix[4]
            )));
        }

        let body_len = u32::from_le_bytes([prefix[6], prefix[7], prefix[8], prefix[9]]) as usize;
        let mut body = vec![0u8; body_len];
        reader.read_exact(&mut body)?;

        let mut checksum_bytes = [0u8; RECORD_SUFFIX_SIZE];
        reader.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = crc32fast::hash(&body);
        if stored_checksum != computed_checksum {
            return Err(StoreError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        let stored: StoredEvent = rmp_serde::from_slice(&body)?;
        let len = (RECORD_PREFIX_SIZE + body_len + RECORD_SUFFIX_SIZE) as u64;
        Ok((stored, len))
    }

    fn into_record(stored: StoredEvent, prepare: u64) -> EventRecord {
        EventRecord {
            stream_id: stored.stream_id,
            revision: StreamRevision(stored.revision),
            event_id: stored.event_id,
            event_type: stored.event_type,
            data: stored.data,
            metadata: stored.metadata,
            is_json: stored.is_json,
            position: Some(Position::new(stored.commit, prepare)),
            created: Timestamp(stored.created),
        }
    }
}

/// Iterator over records in the log, oldest first.
pub struct EventIterator<'a> {
    log: &'a EventLog,
    offset: u64,
    end: u64,
}

impl<'a> Iterator for EventIterator<'a> {
    type Item = Result<EventRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.end {
            return None;
        }

        match self.log.read_uncached(self.offset) {
            Ok((record, next)) => {
                self.offset = next;
                Some(Ok(record))
            }
            Err(e) => {
                self.offset = self.end; // Stop iteration on error
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pending(stream: &str, revision: u64, data: &[u8]) -> PendingEvent {
        PendingEvent {
            stream_id: stream.into(),
            revision: StreamRevision(revision),
            event: NewEvent::raw("test", data.to_vec()),
        }
    }

    #[test]
    fn test_append_and_read() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::open(dir.path().join("events.log")).unwrap();

        let records = log.append_batch(vec![pending("s", 0, b"hello")]).unwrap();
        let position = records[0].position.unwrap();

        assert_eq!(position, Position::new(FILE_HEADER_SIZE, FILE_HEADER_SIZE));
        let read = log.read_at(position.prepare).unwrap();
        assert_eq!(read, records[0]);
        assert_eq!(read.data, b"hello");
    }

    #[test]
    fn test_batch_shares_commit() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::open(dir.path().join("events.log")).unwrap();

        let records = log
            .append_batch(vec![pending("s", 0, b"a"), pending("s", 1, b"b"), pending("s", 2, b"c")])
            .unwrap();

        let commits: Vec<u64> = records.iter().map(|r| r.position.unwrap().commit).collect();
        assert!(commits.iter().all(|c| *c == FILE_HEADER_SIZE));

        let prepares: Vec<u64> = records.iter().map(|r| r.position.unwrap().prepare).collect();
        assert!(prepares.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(log.iter().count(), 3);
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.log");

        {
            let log = EventLog::open(&path).unwrap();
            for i in 0..5 {
                log.append_batch(vec![pending("s", i, format!("event {}", i).as_bytes())])
                    .unwrap();
            }
            log.sync().unwrap();
        }

        {
            let log = EventLog::open(&path).unwrap();
            let records: Vec<_> = log.iter().collect::<Result<_>>().unwrap();
            assert_eq!(records.len(), 5);
            assert_eq!(records[4].revision, StreamRevision(4));

            let before = log.size();
            log.append_batch(vec![pending("s", 5, b"event 5")]).unwrap();
            assert!(log.size() > before);
            assert_eq!(log.iter().count(), 6);
        }
    }

    #[test]
    fn test_corrupted_body_is_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.log");

        {
            let log = EventLog::open(&path).unwrap();
            log.append_batch(vec![pending("s", 0, b"payload")]).unwrap();
            log.sync().unwrap();
        }

        // Flip a byte inside the body.
        let mut bytes = std::fs::read(&path).unwrap();
        let idx = FILE_HEADER_SIZE as usize + RECORD_PREFIX_SIZE + 2;
        bytes[idx] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let log = EventLog::open(&path).unwrap();
        let result = log.read_at(FILE_HEADER_SIZE);
        assert!(matches!(result, Err(StoreError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.log");
        std::fs::write(&path, b"garbage!garbage!").unwrap();

        let result = EventLog::open(&path);
        assert!(matches!(result, Err(StoreError::InvalidFormat(_))));
    }
}
