//! Event filters for all-stream reads and subscriptions.
//!
//! Filters look at the event physically read from the log (the link, not
//! its target, when links are resolved). Regex patterns are applied
//! verbatim: callers anchor them if they need to.

use crate::error::{Result, StoreError};
use crate::streams;
use crate::types::ResolvedEvent;
use regex::Regex;
use std::fmt;

/// Predicate over `(stream id, event type)`.
#[derive(Clone, Debug, Default)]
pub enum EventFilter {
    /// Matches everything.
    #[default]
    None,
    StreamPrefixes(Vec<String>),
    StreamRegex(Regex),
    EventTypePrefixes(Vec<String>),
    EventTypeRegex(Regex),
    /// Matches events whose type does not start with `$`.
    ExcludeSystemEvents,
}

/// What a filter looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterContext {
    StreamId,
    EventType,
}

/// How a filter matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    Prefix,
    Regex,
}

impl EventFilter {
    pub fn stream_prefixes<I, S>(prefixes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(EventFilter::StreamPrefixes(non_empty(prefixes)?))
    }

    pub fn event_type_prefixes<I, S>(prefixes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(EventFilter::EventTypePrefixes(non_empty(prefixes)?))
    }

    pub fn stream_regex(pattern: &str) -> Result<Self> {
        Ok(EventFilter::StreamRegex(Regex::new(pattern)?))
    }

    pub fn event_type_regex(pattern: &str) -> Result<Self> {
        Ok(EventFilter::EventTypeRegex(Regex::new(pattern)?))
    }

    /// Build a filter from a context (`streamid` | `eventtype`), a kind
    /// (`prefix` | `regex`) and comma-separated data.
    pub fn parse(context: &str, kind: &str, data: &str) -> Result<Self> {
        let context = match context.to_ascii_lowercase().as_str() {
            "streamid" | "stream" => FilterContext::StreamId,
            "eventtype" | "type" => FilterContext::EventType,
            other => {
                return Err(StoreError::InvalidFilter(format!(
                    "unknown filter context {:?}",
                    other
                )))
            }
        };
        let kind = match kind.to_ascii_lowercase().as_str() {
            "prefix" => FilterKind::Prefix,
            "regex" => FilterKind::Regex,
            other => {
                return Err(StoreError::InvalidFilter(format!(
                    "unknown filter type {:?}",
                    other
                )))
            }
        };

        match (context, kind) {
            (FilterContext::StreamId, FilterKind::Prefix) => {
                Self::stream_prefixes(data.split(',').map(str::trim))
            }
            (FilterContext::EventType, FilterKind::Prefix) => {
                Self::event_type_prefixes(data.split(',').map(str::trim))
            }
            (FilterContext::StreamId, FilterKind::Regex) => Self::stream_regex(data),
            (FilterContext::EventType, FilterKind::Regex) => Self::event_type_regex(data),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, EventFilter::None)
    }

    /// Pure, total predicate.
    pub fn matches(&self, event: &ResolvedEvent) -> bool {
        let original = event.original_event();
        self.matches_parts(&original.stream_id, &original.event_type)
    }

    pub fn matches_parts(&self, stream_id: &str, event_type: &str) -> bool {
        match self {
            EventFilter::None => true,
            EventFilter::StreamPrefixes(prefixes) => {
                prefixes.iter().any(|p| stream_id.starts_with(p.as_str()))
            }
            EventFilter::StreamRegex(re) => re.is_match(stream_id),
            EventFilter::EventTypePrefixes(prefixes) => {
                prefixes.iter().any(|p| event_type.starts_with(p.as_str()))
            }
            EventFilter::EventTypeRegex(re) => re.is_match(event_type),
            EventFilter::ExcludeSystemEvents => !streams::is_system_event_type(event_type),
        }
    }
}

fn non_empty<I, S>(prefixes: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let prefixes: Vec<String> = prefixes
        .into_iter()
        .map(Into::into)
        .filter(|p| !p.is_empty())
        .collect();
    if prefixes.is_empty() {
        return Err(StoreError::InvalidFilter(
            "prefix filter needs at least one prefix".into(),
        ));
    }
    Ok(prefixes)
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventFilter::None => write!(f, "none"),
            EventFilter::StreamPrefixes(p) => write!(f, "streamid prefix [{}]", p.join(",")),
            EventFilter::StreamRegex(re) => write!(f, "streamid regex {}", re.as_str()),
            EventFilter::EventTypePrefixes(p) => write!(f, "eventtype prefix [{}]", p.join(",")),
            EventFilter::EventTypeRegex(re) => write!(f, "eventtype regex {}", re.as_str()),
            EventFilter::ExcludeSystemEvents => write!(f, "exclude system events"),
        }
    }
}
