//! Error types for the event store and its enumerators.

use crate::types::{Position, StreamRevision};
use thiserror::Error;

/// Main error type for store and enumerator operations.
///
/// Subscription outcomes such as access denial or a deleted stream are not
/// errors; they are delivered as [`crate::ReadResponse::Failed`]. This type
/// covers collaborator failures the caller may want to retry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Invalid position: {0}")]
    InvalidPosition(Position),

    #[error("Wrong expected revision for {stream}: expected {expected}, actual {actual:?}")]
    WrongExpectedRevision {
        stream: String,
        expected: String,
        actual: Option<StreamRevision>,
    },

    #[error("Stream deleted: {0}")]
    StreamDeleted(String),

    #[error("Invalid stream name: {0:?}")]
    InvalidStreamName(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Read requires a leader node")]
    NotLeader,

    #[error("Live feed closed")]
    LiveFeedClosed,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

impl From<regex::Error> for StoreError {
    fn from(e: regex::Error) -> Self {
        StoreError::InvalidFilter(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
