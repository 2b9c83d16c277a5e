//! Stream metadata carried by `$$<stream>` metastreams.

use crate::acl::StreamAcl;
use crate::types::{StreamRevision, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Truncation and access settings of one stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    #[serde(rename = "$maxCount", default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u64>,

    /// Seconds. Zero has no effect.
    #[serde(rename = "$maxAge", default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,

    #[serde(rename = "$tb", default, skip_serializing_if = "Option::is_none")]
    pub truncate_before: Option<u64>,

    #[serde(rename = "$acl", default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<StreamAcl>,
}

impl StreamMetadata {
    /// Parse metadata, treating unparseable JSON as empty.
    pub fn from_slice(stream: &str, data: &[u8]) -> Self {
        match serde_json::from_slice(data) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(stream, error = %e, "ignoring unparseable stream metadata");
                Self::default()
            }
        }
    }

    pub fn to_vec(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn with_truncate_before(mut self, revision: u64) -> Self {
        self.truncate_before = Some(revision);
        self
    }

    pub fn with_max_count(mut self, max_count: u64) -> Self {
        self.max_count = Some(max_count);
        self
    }

    pub fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn with_acl(mut self, acl: StreamAcl) -> Self {
        self.acl = Some(acl);
        self
    }

    /// Lowest revision still visible given the stream's last revision.
    pub fn first_visible_revision(&self, last: Option<StreamRevision>) -> StreamRevision {
        let tb = self.truncate_before.unwrap_or(0);
        let by_count = match (self.max_count, last) {
            (Some(max), Some(last)) => (last.0 + 1).saturating_sub(max),
            (Some(_), None) | (None, _) => 0,
        };
        StreamRevision(tb.max(by_count))
    }

    /// True if an event created at `created` is past `$maxAge` at `now`.
    pub fn is_expired(&self, created: Timestamp, now: Timestamp) -> bool {
        match self.max_age {
            Some(age) if age > 0 => created.seconds_until(now) >= age as i64,
            _ => false,
        }
    }

    /// True if the event at `revision` is visible.
    pub fn is_visible(
        &self,
        revision: StreamRevision,
        created: Timestamp,
        last: Option<StreamRevision>,
        now: Timestamp,
    ) -> bool {
        revision >= self.first_visible_revision(last) && !self.is_expired(created, now)
    }
}
