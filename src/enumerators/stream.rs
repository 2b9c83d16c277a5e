//! Catch-up subscription to a single stream.

use super::driver::{drive, Core, Step};
use super::response::{FailureReason, ReadResponse};
use super::state::{Phase, SubscriptionState};
use crate::acl::{AccessChecker, Operation, Principal};
use crate::cancel::CancellationToken;
use crate::config::EnumeratorOptions;
use crate::error::{Result, StoreError};
use crate::live::{FeedScope, LiveFeed, LiveMessage, LiveRecv};
use crate::reader::{HistoricalReader, ReadDirection, ReadOptions};
use crate::records::StreamStatus;
use crate::types::{ResolvedEvent, StreamRevision};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Parameters of a subscription to one stream.
#[derive(Clone, Debug, Default)]
pub struct StreamSubscriptionRequest {
    pub stream: String,
    /// Resume after this revision. `None` reads from the first visible
    /// event; `StreamRevision::END` starts at the stream's last event.
    /// Revisions past the end are not rejected: the subscription waits.
    pub checkpoint: Option<StreamRevision>,
    pub resolve_links: bool,
    pub principal: Principal,
    pub requires_leader: bool,
    pub cancellation: CancellationToken,
}

/// Subscription to the visible events of one stream.
///
/// Reaching a tombstone delivers it and then fails with `StreamDeleted`.
/// A soft-deleted stream just goes quiet until it is written again.
pub struct StreamSubscription {
    core: Core<StreamRevision>,
    reader: Arc<dyn HistoricalReader>,
    feed: Arc<dyn LiveFeed>,
    access: Arc<dyn AccessChecker>,
    stream: String,
    checkpoint: Option<StreamRevision>,
    principal: Principal,
    read_options: ReadOptions,
    page_size: usize,
    tail: Option<StreamRevision>,
    cursor: StreamRevision,
    pending: Option<ResolvedEvent>,
}

impl StreamSubscription {
    pub(crate) fn new(
        reader: Arc<dyn HistoricalReader>,
        feed: Arc<dyn LiveFeed>,
        access: Arc<dyn AccessChecker>,
        options: &EnumeratorOptions,
        request: StreamSubscriptionRequest,
    ) -> Self {
        let subscription_id = Uuid::new_v4().to_string();
        debug!(
            subscription_id = %subscription_id,
            stream = %request.stream,
            checkpoint = ?request.checkpoint,
            "subscribing to stream"
        );

        Self {
            core: Core::new(subscription_id, request.cancellation),
            reader,
            feed,
            access,
            stream: request.stream,
            checkpoint: request.checkpoint,
            principal: request.principal,
            read_options: ReadOptions {
                resolve_links: request.resolve_links,
                requires_leader: request.requires_leader,
            },
            page_size: options.read_batch_size.max(1),
            tail: None,
            cursor: StreamRevision::START,
            pending: None,
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.core.subscription_id
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn state(&self) -> &SubscriptionState<StreamRevision> {
        &self.core.state
    }

    /// Pull the next response, blocking while live and idle.
    pub fn next_response(&mut self) -> Result<Option<ReadResponse>> {
        drive(self)
    }

    pub fn dispose(&mut self) {
        self.core.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    fn start(&mut self) -> Result<()> {
        if !self.can_read() {
            self.core.push(ReadResponse::Failed(FailureReason::AccessDenied));
            return Ok(());
        }

        let (live, confirmation) = self.feed.subscribe(FeedScope::Stream(self.stream.clone()))?;
        self.core.live = Some(live);
        self.core.push(ReadResponse::SubscriptionConfirmed {
            subscription_id: self.core.subscription_id.clone(),
        });

        let tail = confirmation.last_revision;
        let start = match self.checkpoint {
            None => None,
            Some(r) if r.is_end() => tail,
            Some(r) => Some(r),
        };
        self.core.state.last_seen = start;
        debug!(
            subscription_id = %self.core.subscription_id,
            stream = %self.stream,
            start = ?start,
            tail = ?tail,
            deleted = confirmation.stream_deleted,
            "subscription confirmed"
        );

        if confirmation.stream_deleted && self.core.state.reached(tail) {
            self.fail_deleted();
            return Ok(());
        }

        self.begin_catch_up(tail);
        Ok(())
    }

    fn begin_catch_up(&mut self, tail: Option<StreamRevision>) {
        self.tail = tail;
        if self.core.state.reached(tail) {
            self.finish_catch_up();
        } else {
            self.cursor = self
                .core
                .state
                .last_seen
                .map_or(StreamRevision::START, StreamRevision::next);
            self.core.set_phase(Phase::CatchingUp);
        }
    }

    fn catch_up(&mut self) -> Result<()> {
        let page = self.reader.read_stream(
            &self.stream,
            self.cursor,
            ReadDirection::Forwards,
            self.page_size,
            self.read_options,
        )?;
        trace!(
            subscription_id = %self.core.subscription_id,
            stream = %self.stream,
            from = %self.cursor,
            count = page.events.len(),
            status = ?page.status,
            "catch-up page"
        );

        if page.status == StreamStatus::NoStream {
            self.finish_catch_up();
            return Ok(());
        }

        for event in page.events {
            let revision = event.original_revision();
            if self.core.state.has_seen(revision) {
                continue;
            }
            if !self.process(event, revision) {
                return Ok(());
            }
        }

        self.cursor = page.next;
        if page.is_end_of_stream || self.core.state.reached(self.tail) {
            self.finish_catch_up();
        }
        Ok(())
    }

    fn finish_catch_up(&mut self) {
        self.core.push(ReadResponse::CaughtUp);
        self.core.set_phase(Phase::Live);
        debug!(
            subscription_id = %self.core.subscription_id,
            stream = %self.stream,
            last_seen = ?self.core.state.last_seen,
            "caught up"
        );
    }

    fn receive_live(&mut self) -> Result<()> {
        if let Some(event) = self.pending.take() {
            return self.handle_live_event(event);
        }

        let Some(live) = self.core.live.as_mut() else {
            self.core.set_phase(Phase::FallingBehind);
            return Ok(());
        };

        match live.recv(&self.core.cancel) {
            LiveRecv::Cancelled => {
                self.core.dispose();
                Ok(())
            }
            LiveRecv::Closed => Err(StoreError::LiveFeedClosed),
            LiveRecv::Message { missed: true, .. } => {
                warn!(
                    subscription_id = %self.core.subscription_id,
                    stream = %self.stream,
                    last_seen = ?self.core.state.last_seen,
                    "subscription fell behind the live feed"
                );
                self.core.live = None;
                self.core.push(ReadResponse::FellBehind);
                self.core.set_phase(Phase::FallingBehind);
                Ok(())
            }
            LiveRecv::Message {
                message: LiveMessage::Event(event),
                ..
            } => self.handle_live_event(event),
            LiveRecv::Message {
                message: LiveMessage::MetadataChanged { .. },
                ..
            } => {
                if !self.can_read() {
                    debug!(subscription_id = %self.core.subscription_id, stream = %self.stream, "access revoked");
                    self.core.push(ReadResponse::Failed(FailureReason::AccessDenied));
                }
                Ok(())
            }
        }
    }

    fn handle_live_event(&mut self, event: ResolvedEvent) -> Result<()> {
        let revision = event.original_revision();
        if self.core.state.has_seen(revision) {
            return Ok(());
        }

        let event = if self.read_options.resolve_links && event.event.is_link() {
            match self.reader.resolve(event.event.clone(), self.read_options) {
                Ok(resolved) => resolved,
                Err(e) => {
                    self.pending = Some(event);
                    return Err(e);
                }
            }
        } else {
            event
        };

        self.process(event, revision);
        Ok(())
    }

    fn resubscribe(&mut self) -> Result<()> {
        let (live, confirmation) = self.feed.subscribe(FeedScope::Stream(self.stream.clone()))?;
        self.core.live = Some(live);
        self.begin_catch_up(confirmation.last_revision);
        Ok(())
    }

    /// Deliver one event. Returns false once a terminal response is queued.
    fn process(&mut self, event: ResolvedEvent, revision: StreamRevision) -> bool {
        if !self.can_read() {
            debug!(subscription_id = %self.core.subscription_id, stream = %self.stream, %revision, "access revoked");
            self.core.push(ReadResponse::Failed(FailureReason::AccessDenied));
            return false;
        }

        let tombstone = event.original_event().is_tombstone();
        trace!(subscription_id = %self.core.subscription_id, stream = %self.stream, %revision, "event");
        self.core.state.mark_seen(revision);
        self.core.state.mark_delivered(revision);
        self.core.push(ReadResponse::Event(event));

        if tombstone {
            self.fail_deleted();
            return false;
        }
        true
    }

    fn fail_deleted(&mut self) {
        self.core.push(ReadResponse::Failed(FailureReason::StreamDeleted {
            stream: self.stream.clone(),
        }));
    }
}

impl Step for StreamSubscription {
    type Checkpoint = StreamRevision;

    fn core(&mut self) -> &mut Core<StreamRevision> {
        &mut self.core
    }

    fn can_read(&self) -> bool {
        self.access
            .check(&self.principal, &Operation::read(self.stream.as_str()))
    }

    fn step(&mut self) -> Result<()> {
        match self.core.phase() {
            Phase::Initializing => self.start(),
            Phase::CatchingUp => self.catch_up(),
            Phase::Live => self.receive_live(),
            Phase::FallingBehind => self.resubscribe(),
            Phase::Terminated => Ok(()),
        }
    }
}

impl Iterator for StreamSubscription {
    type Item = Result<ReadResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_response().transpose()
    }
}

impl Drop for StreamSubscription {
    fn drop(&mut self) {
        self.core.dispose();
    }
}
