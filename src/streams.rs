//! Stream naming rules.

/// The virtual stream spanning the whole log.
pub const ALL: &str = "$all";

/// Stream holding default ACL settings.
pub const SETTINGS: &str = "$settings";

/// Event type of stream metadata writes.
pub const METADATA_EVENT_TYPE: &str = "$metadata";

/// Event type of the tombstone written by a hard delete.
pub const STREAM_DELETED_EVENT_TYPE: &str = "$streamDeleted";

/// Event type of link events.
pub const LINK_EVENT_TYPE: &str = "$>";

/// Prefix of in-memory streams that only keep their latest event.
pub const EPHEMERAL_PREFIX: &str = "$mem-";

const METASTREAM_PREFIX: &str = "$$";

pub fn is_system_stream(stream: &str) -> bool {
    stream.starts_with('$')
}

pub fn is_system_event_type(event_type: &str) -> bool {
    event_type.starts_with('$')
}

pub fn is_metastream(stream: &str) -> bool {
    stream.starts_with(METASTREAM_PREFIX)
}

pub fn is_ephemeral(stream: &str) -> bool {
    stream.starts_with(EPHEMERAL_PREFIX)
}

/// `$$<stream>`
pub fn metastream_of(stream: &str) -> String {
    format!("{}{}", METASTREAM_PREFIX, stream)
}

/// Stream described by a metastream, or `None` if `stream` is not one.
pub fn original_stream_of(stream: &str) -> Option<&str> {
    stream.strip_prefix(METASTREAM_PREFIX)
}
