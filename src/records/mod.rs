//! Event log and stream index.
//!
//! Events are stored in an append-only log; the stream index is kept in
//! memory and rebuilt from the log on open.

mod index;
mod log;

pub use index::{IndexEntry, StreamIndex, StreamSlice, StreamStatus};
pub use log::{EventIterator, EventLog, PendingEvent, FILE_HEADER_SIZE};
