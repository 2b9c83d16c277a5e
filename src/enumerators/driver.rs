//! Pull loop shared by every enumerator.

use super::response::{FailureReason, ReadResponse};
use super::state::{Phase, SubscriptionState};
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::live::LiveSubscription;
use std::collections::VecDeque;
use tracing::{debug, error};

/// State every enumerator carries besides its own cursor.
pub(crate) struct Core<C> {
    pub(crate) subscription_id: String,
    pub(crate) state: SubscriptionState<C>,
    pub(crate) outbox: VecDeque<ReadResponse>,
    pub(crate) cancel: CancellationToken,
    pub(crate) live: Option<LiveSubscription>,
    disposed: bool,
}

impl<C: Copy + Ord> Core<C> {
    pub(crate) fn new(subscription_id: String, cancel: CancellationToken) -> Self {
        Self {
            subscription_id,
            state: SubscriptionState::new(),
            outbox: VecDeque::new(),
            cancel,
            live: None,
            disposed: false,
        }
    }

    pub(crate) fn push(&mut self, response: ReadResponse) {
        self.outbox.push_back(response);
    }

    pub(crate) fn phase(&self) -> Phase {
        self.state.phase
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.state.phase = phase;
    }

    /// Stop after the queued responses are handed out.
    fn terminate(&mut self) {
        self.state.phase = Phase::Terminated;
        self.live = None;
        self.outbox.clear();
    }

    /// Tear down immediately. Idempotent.
    pub(crate) fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.terminate();
        debug!(subscription_id = %self.subscription_id, "enumerator disposed");
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// One unit of work of an enumerator.
pub(crate) trait Step {
    type Checkpoint: Copy + Ord;

    fn core(&mut self) -> &mut Core<Self::Checkpoint>;

    /// Read access to the target, checked again as each event is handed out.
    fn can_read(&self) -> bool;

    /// Advance the current phase, queuing zero or more responses.
    ///
    /// On `Err` no state has changed, so the next pull retries.
    fn step(&mut self) -> Result<()>;
}

/// Hand out the next response, stepping until one is available.
///
/// Events queued from a page are re-checked against the ACL when handed
/// out, so a revocation fails the very next pull.
pub(crate) fn drive<S: Step>(enumerator: &mut S) -> Result<Option<ReadResponse>> {
    loop {
        let next = {
            let core = enumerator.core();
            if core.disposed {
                return Ok(None);
            }
            if core.cancel.is_cancelled() {
                core.dispose();
                return Ok(None);
            }
            match core.outbox.pop_front() {
                Some(response) => Some(response),
                None if core.state.phase == Phase::Terminated => return Ok(None),
                None => None,
            }
        };

        if let Some(mut response) = next {
            if matches!(response, ReadResponse::Event(_)) && !enumerator.can_read() {
                response = ReadResponse::Failed(FailureReason::AccessDenied);
            }
            let core = enumerator.core();
            if response.is_terminal() {
                debug!(subscription_id = %core.subscription_id, ?response, "enumerator ended");
                core.terminate();
            }
            return Ok(Some(response));
        }

        if let Err(e) = enumerator.step() {
            error!(subscription_id = %enumerator.core().subscription_id, error = %e, "step failed");
            return Err(e);
        }
    }
}
