//! Catch-up subscription to `$all`, plain or filtered.

use super::driver::{drive, Core, Step};
use super::response::{FailureReason, ReadResponse};
use super::state::{Phase, SubscriptionState};
use crate::acl::{AccessChecker, Operation, Principal};
use crate::cancel::CancellationToken;
use crate::config::EnumeratorOptions;
use crate::error::{Result, StoreError};
use crate::filter::EventFilter;
use crate::live::{FeedScope, LiveFeed, LiveMessage, LiveRecv};
use crate::reader::{HistoricalReader, ReadDirection, ReadOptions};
use crate::streams;
use crate::types::{Position, ResolvedEvent};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Parameters of a subscription to `$all`.
#[derive(Clone, Debug, Default)]
pub struct AllSubscriptionRequest {
    /// Resume after this position. `None` or `Position::START` reads from the
    /// beginning; `Position::END` starts at the tail.
    pub checkpoint: Option<Position>,
    /// `EventFilter::None` makes a plain subscription; anything else a
    /// filtered one that also emits checkpoints.
    pub filter: EventFilter,
    pub resolve_links: bool,
    pub principal: Principal,
    pub requires_leader: bool,
    /// Events scanned per page by a filtered subscription.
    pub max_search_window: Option<u32>,
    pub checkpoint_interval_multiplier: Option<u32>,
    pub cancellation: CancellationToken,
}

/// Subscription to every event in the log.
pub struct AllSubscription {
    core: Core<Position>,
    reader: Arc<dyn HistoricalReader>,
    feed: Arc<dyn LiveFeed>,
    access: Arc<dyn AccessChecker>,
    checkpoint: Option<Position>,
    filter: EventFilter,
    principal: Principal,
    read_options: ReadOptions,
    page_size: usize,
    /// Set for filtered subscriptions only.
    checkpoint_interval: Option<u64>,
    tail: Option<Position>,
    cursor: Position,
    last_checkpoint: Option<Position>,
    /// Live event whose link resolution failed; retried on the next pull.
    pending: Option<ResolvedEvent>,
}

impl AllSubscription {
    pub(crate) fn new(
        reader: Arc<dyn HistoricalReader>,
        feed: Arc<dyn LiveFeed>,
        access: Arc<dyn AccessChecker>,
        options: &EnumeratorOptions,
        request: AllSubscriptionRequest,
    ) -> Self {
        let batch = options.read_batch_size.max(1);
        let filtered = !request.filter.is_none();
        let window = request
            .max_search_window
            .map(|w| (w as usize).max(1))
            .unwrap_or(batch);
        let multiplier = request
            .checkpoint_interval_multiplier
            .unwrap_or(options.default_checkpoint_interval_multiplier)
            .max(1);

        let (page_size, checkpoint_interval) = if filtered {
            (window, Some(window as u64 * multiplier as u64))
        } else {
            (batch, None)
        };

        let subscription_id = Uuid::new_v4().to_string();
        debug!(
            subscription_id = %subscription_id,
            checkpoint = ?request.checkpoint,
            filter = %request.filter,
            "subscribing to $all"
        );

        Self {
            core: Core::new(subscription_id, request.cancellation),
            reader,
            feed,
            access,
            checkpoint: request.checkpoint,
            filter: request.filter,
            principal: request.principal,
            read_options: ReadOptions {
                resolve_links: request.resolve_links,
                requires_leader: request.requires_leader,
            },
            page_size,
            checkpoint_interval,
            tail: None,
            cursor: Position::START,
            last_checkpoint: None,
            pending: None,
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.core.subscription_id
    }

    pub fn state(&self) -> &SubscriptionState<Position> {
        &self.core.state
    }

    pub fn is_filtered(&self) -> bool {
        self.checkpoint_interval.is_some()
    }

    /// Pull the next response, blocking while live and idle.
    ///
    /// `Ok(None)` after a terminal response, disposal or cancellation.
    pub fn next_response(&mut self) -> Result<Option<ReadResponse>> {
        drive(self)
    }

    /// Unsubscribe and drop buffered responses. Idempotent.
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

        let (live, confirmation) = self.feed.subscribe(FeedScope::All)?;
        self.core.live = Some(live);
        self.core.push(ReadResponse::SubscriptionConfirmed {
            subscription_id: self.core.subscription_id.clone(),
        });

        let start = match self.checkpoint {
            None => None,
            Some(p) if p.is_start() => None,
            Some(p) if p.is_end() => confirmation.last_position,
            Some(p) => Some(p),
        };
        self.core.state.last_seen = start;
        debug!(
            subscription_id = %self.core.subscription_id,
            start = ?start,
            tail = ?confirmation.last_position,
            "subscription confirmed"
        );

        self.begin_catch_up(confirmation.last_position);
        Ok(())
    }

    fn begin_catch_up(&mut self, tail: Option<Position>) {
        self.tail = tail;
        if self.core.state.reached(tail) {
            self.finish_catch_up();
        } else {
            self.cursor = self.core.state.last_seen.unwrap_or(Position::START);
            self.core.set_phase(Phase::CatchingUp);
        }
    }

    fn catch_up(&mut self) -> Result<()> {
        let page = match self.reader.read_all(
            self.cursor,
            ReadDirection::Forwards,
            self.page_size,
            self.read_options,
        ) {
            Ok(page) => page,
            Err(StoreError::InvalidPosition(position)) => {
                debug!(subscription_id = %self.core.subscription_id, %position, "invalid start position");
                self.core.push(ReadResponse::Failed(FailureReason::InvalidPosition));
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        trace!(
            subscription_id = %self.core.subscription_id,
            from = %self.cursor,
            count = page.events.len(),
            "catch-up page"
        );

        for event in page.events {
            let Some(position) = event.original_position() else {
                continue;
            };
            if self.core.state.has_seen(position) {
                continue;
            }
            if !self.process(event, position) {
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
        if self.is_filtered() && self.core.state.scanned_since_checkpoint > 0 {
            if let Some(position) = self.core.state.last_seen {
                self.emit_checkpoint(position);
            }
        }
        self.core.push(ReadResponse::CaughtUp);
        self.core.set_phase(Phase::Live);
        debug!(
            subscription_id = %self.core.subscription_id,
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
                self.fall_behind();
                Ok(())
            }
            LiveRecv::Message {
                message: LiveMessage::Event(event),
                ..
            } => self.handle_live_event(event),
            LiveRecv::Message {
                message: LiveMessage::MetadataChanged { .. },
                ..
            } => Ok(()),
        }
    }

    fn handle_live_event(&mut self, event: ResolvedEvent) -> Result<()> {
        let Some(position) = event.original_position() else {
            return Ok(());
        };
        if self.core.state.has_seen(position) {
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

        self.process(event, position);
        Ok(())
    }

    fn fall_behind(&mut self) {
        warn!(
            subscription_id = %self.core.subscription_id,
            last_seen = ?self.core.state.last_seen,
            "subscription fell behind the live feed"
        );
        self.core.live = None;
        self.core.push(ReadResponse::FellBehind);
        self.core.set_phase(Phase::FallingBehind);
    }

    fn resubscribe(&mut self) -> Result<()> {
        let (live, confirmation) = self.feed.subscribe(FeedScope::All)?;
        self.core.live = Some(live);
        self.begin_catch_up(confirmation.last_position);
        Ok(())
    }

    /// Scan one event. Returns false once a terminal response is queued.
    fn process(&mut self, event: ResolvedEvent, position: Position) -> bool {
        if !self.can_read() {
            debug!(subscription_id = %self.core.subscription_id, %position, "access revoked");
            self.core.push(ReadResponse::Failed(FailureReason::AccessDenied));
            return false;
        }

        self.core.state.mark_seen(position);
        if self.filter.matches(&event) {
            trace!(
                subscription_id = %self.core.subscription_id,
                %position,
                stream = event.original_stream_id(),
                "event"
            );
            self.core.state.mark_delivered(position);
            self.core.push(ReadResponse::Event(event));
        }

        if let Some(interval) = self.checkpoint_interval {
            self.core.state.scanned_since_checkpoint += 1;
            if self.core.state.scanned_since_checkpoint >= interval {
                self.emit_checkpoint(position);
            }
        }
        true
    }

    fn emit_checkpoint(&mut self, position: Position) {
        self.core.state.scanned_since_checkpoint = 0;
        if self.last_checkpoint.map_or(true, |last| position > last) {
            self.last_checkpoint = Some(position);
            self.core.push(ReadResponse::Checkpoint(position));
        }
    }
}

impl Step for AllSubscription {
    type Checkpoint = Position;

    fn core(&mut self) -> &mut Core<Position> {
        &mut self.core
    }

    fn can_read(&self) -> bool {
        self.access
            .check(&self.principal, &Operation::read(streams::ALL))
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

impl Iterator for AllSubscription {
    type Item = Result<ReadResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_response().transpose()
    }
}

impl Drop for AllSubscription {
    fn drop(&mut self) {
        self.core.dispose();
    }
}
