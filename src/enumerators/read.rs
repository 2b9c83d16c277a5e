//! One-shot reads: the catch-up path without a live tail.

use super::driver::{drive, Core, Step};
use super::response::{FailureReason, ReadResponse};
use super::state::Phase;
use crate::acl::{AccessChecker, Operation, Principal};
use crate::cancel::CancellationToken;
use crate::config::EnumeratorOptions;
use crate::error::{Result, StoreError};
use crate::filter::EventFilter;
use crate::reader::{HistoricalReader, ReadDirection, ReadOptions};
use crate::records::StreamStatus;
use crate::streams;
use crate::types::{Position, StreamRevision};
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

/// Parameters of a read over `$all`.
#[derive(Clone, Debug)]
pub struct ReadAllRequest {
    /// Forward reads include `from`, backward reads exclude it.
    pub from: Position,
    pub direction: ReadDirection,
    pub max_count: u64,
    pub filter: EventFilter,
    pub max_search_window: Option<u32>,
    pub resolve_links: bool,
    pub principal: Principal,
    pub requires_leader: bool,
    pub cancellation: CancellationToken,
}

impl Default for ReadAllRequest {
    fn default() -> Self {
        Self {
            from: Position::START,
            direction: ReadDirection::Forwards,
            max_count: u64::MAX,
            filter: EventFilter::None,
            max_search_window: None,
            resolve_links: false,
            principal: Principal::anonymous(),
            requires_leader: false,
            cancellation: CancellationToken::new(),
        }
    }
}

/// Parameters of a read over one stream. Both directions include `from`.
#[derive(Clone, Debug)]
pub struct ReadStreamRequest {
    pub stream: String,
    pub from: StreamRevision,
    pub direction: ReadDirection,
    pub max_count: u64,
    pub resolve_links: bool,
    pub principal: Principal,
    pub requires_leader: bool,
    pub cancellation: CancellationToken,
}

impl Default for ReadStreamRequest {
    fn default() -> Self {
        Self {
            stream: String::new(),
            from: StreamRevision::START,
            direction: ReadDirection::Forwards,
            max_count: u64::MAX,
            resolve_links: false,
            principal: Principal::anonymous(),
            requires_leader: false,
            cancellation: CancellationToken::new(),
        }
    }
}

/// Bounded read over `$all`, optionally filtered. Ends with `Done`.
pub struct ReadAll {
    core: Core<Position>,
    reader: Arc<dyn HistoricalReader>,
    access: Arc<dyn AccessChecker>,
    cursor: Position,
    direction: ReadDirection,
    remaining: u64,
    filter: EventFilter,
    principal: Principal,
    read_options: ReadOptions,
    batch_size: usize,
    search_window: Option<usize>,
}

impl ReadAll {
    pub(crate) fn new(
        reader: Arc<dyn HistoricalReader>,
        access: Arc<dyn AccessChecker>,
        options: &EnumeratorOptions,
        request: ReadAllRequest,
    ) -> Self {
        let batch_size = options.read_batch_size.max(1);
        let search_window = (!request.filter.is_none()).then(|| {
            request
                .max_search_window
                .map(|w| (w as usize).max(1))
                .unwrap_or(batch_size)
        });

        Self {
            core: Core::new(Uuid::new_v4().to_string(), request.cancellation),
            reader,
            access,
            cursor: request.from,
            direction: request.direction,
            remaining: request.max_count,
            filter: request.filter,
            principal: request.principal,
            read_options: ReadOptions {
                resolve_links: request.resolve_links,
                requires_leader: request.requires_leader,
            },
            batch_size,
            search_window,
        }
    }

    pub fn next_response(&mut self) -> Result<Option<ReadResponse>> {
        drive(self)
    }

    pub fn dispose(&mut self) {
        self.core.dispose();
    }

    fn start(&mut self) {
        if !self.can_read() {
            self.core.push(ReadResponse::Failed(FailureReason::AccessDenied));
        } else if self.remaining == 0 {
            self.core.push(ReadResponse::Done);
        } else {
            debug!(
                read_id = %self.core.subscription_id,
                from = %self.cursor,
                direction = ?self.direction,
                filter = %self.filter,
                "reading $all"
            );
            self.core.set_phase(Phase::CatchingUp);
        }
    }

    fn read_page(&mut self) -> Result<()> {
        let page_size = match self.search_window {
            Some(window) => window,
            None => self.batch_size.min(usize::try_from(self.remaining).unwrap_or(usize::MAX)),
        };

        let page = match self
            .reader
            .read_all(self.cursor, self.direction, page_size, self.read_options)
        {
            Ok(page) => page,
            Err(StoreError::InvalidPosition(_)) => {
                self.core.push(ReadResponse::Failed(FailureReason::InvalidPosition));
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        trace!(read_id = %self.core.subscription_id, from = %self.cursor, count = page.events.len(), "read page");

        for event in page.events {
            if !self.can_read() {
                self.core.push(ReadResponse::Failed(FailureReason::AccessDenied));
                return Ok(());
            }
            if !self.filter.matches(&event) {
                continue;
            }
            self.core.push(ReadResponse::Event(event));
            self.remaining -= 1;
            if self.remaining == 0 {
                self.core.push(ReadResponse::Done);
                return Ok(());
            }
        }

        self.cursor = page.next;
        if page.is_end_of_stream {
            self.core.push(ReadResponse::Done);
        }
        Ok(())
    }
}

impl Step for ReadAll {
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
            Phase::Initializing => {
                self.start();
                Ok(())
            }
            Phase::CatchingUp => self.read_page(),
            Phase::Live | Phase::FallingBehind | Phase::Terminated => Ok(()),
        }
    }
}

impl Iterator for ReadAll {
    type Item = Result<ReadResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_response().transpose()
    }
}

/// Bounded read over one stream. Ends with `Done`.
pub struct ReadStream {
    core: Core<StreamRevision>,
    reader: Arc<dyn HistoricalReader>,
    access: Arc<dyn AccessChecker>,
    stream: String,
    cursor: StreamRevision,
    direction: ReadDirection,
    remaining: u64,
    principal: Principal,
    read_options: ReadOptions,
    batch_size: usize,
    delivered: u64,
}

impl ReadStream {
    pub(crate) fn new(
        reader: Arc<dyn HistoricalReader>,
        access: Arc<dyn AccessChecker>,
        options: &EnumeratorOptions,
        request: ReadStreamRequest,
    ) -> Self {
        Self {
            core: Core::new(Uuid::new_v4().to_string(), request.cancellation),
            reader,
            access,
            stream: request.stream,
            cursor: request.from,
            direction: request.direction,
            remaining: request.max_count,
            principal: request.principal,
            read_options: ReadOptions {
                resolve_links: request.resolve_links,
                requires_leader: request.requires_leader,
            },
            batch_size: options.read_batch_size.max(1),
            delivered: 0,
        }
    }

    pub fn next_response(&mut self) -> Result<Option<ReadResponse>> {
        drive(self)
    }

    pub fn dispose(&mut self) {
        self.core.dispose();
    }

    fn start(&mut self) {
        if !self.can_read() {
            self.core.push(ReadResponse::Failed(FailureReason::AccessDenied));
        } else if self.remaining == 0 {
            self.core.push(ReadResponse::Done);
        } else {
            debug!(
                read_id = %self.core.subscription_id,
                stream = %self.stream,
                from = %self.cursor,
                direction = ?self.direction,
                "reading stream"
            );
            self.core.set_phase(Phase::CatchingUp);
        }
    }

    fn read_page(&mut self) -> Result<()> {
        let page_size = self
            .batch_size
            .min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let page = self.reader.read_stream(
            &self.stream,
            self.cursor,
            self.direction,
            page_size,
            self.read_options,
        )?;
        trace!(read_id = %self.core.subscription_id, stream = %self.stream, from = %self.cursor, count = page.events.len(), "read page");

        match page.status {
            StreamStatus::NoStream if self.delivered == 0 => {
                self.core.push(ReadResponse::Failed(FailureReason::StreamNotFound {
                    stream: self.stream.clone(),
                }));
                return Ok(());
            }
            StreamStatus::Deleted => {
                self.core.push(ReadResponse::Failed(FailureReason::StreamDeleted {
                    stream: self.stream.clone(),
                }));
                return Ok(());
            }
            StreamStatus::NoStream | StreamStatus::Ok => {}
        }

        for event in page.events {
            if !self.can_read() {
                self.core.push(ReadResponse::Failed(FailureReason::AccessDenied));
                return Ok(());
            }
            self.core.push(ReadResponse::Event(event));
            self.delivered += 1;
            self.remaining -= 1;
            if self.remaining == 0 {
                self.core.push(ReadResponse::Done);
                return Ok(());
            }
        }

        self.cursor = page.next;
        if page.is_end_of_stream {
            self.core.push(ReadResponse::Done);
        }
        Ok(())
    }
}

impl Step for ReadStream {
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
            Phase::Initializing => {
                self.start();
                Ok(())
            }
            Phase::CatchingUp => self.read_page(),
            Phase::Live | Phase::FallingBehind | Phase::Terminated => Ok(()),
        }
    }
}

impl Iterator for ReadStream {
    type Item = Result<ReadResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_response().transpose()
    }
}
