//! Per-enumerator state. Owned by exactly one enumerator; never shared.

/// Where an enumerator is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    CatchingUp,
    Live,
    /// Live attachment dropped after an overrun; next step resubscribes.
    FallingBehind,
    Terminated,
}

/// Progress of one enumerator over checkpoints of type `C`
/// (`Position` for `$all`, `StreamRevision` for a stream).
#[derive(Clone, Debug)]
pub struct SubscriptionState<C> {
    pub phase: Phase,
    /// Everything at or before this point has been processed. Catch-up
    /// resumes after it and live notifications at or before it are dropped.
    pub last_seen: Option<C>,
    /// Last checkpoint of an emitted `Event`.
    pub last_delivered: Option<C>,
    /// Events scanned since the last `Checkpoint` response.
    pub scanned_since_checkpoint: u64,
}

impl<C: Copy + Ord> SubscriptionState<C> {
    pub fn new() -> Self {
        Self {
            phase: Phase::Initializing,
            last_seen: None,
            last_delivered: None,
            scanned_since_checkpoint: 0,
        }
    }

    /// True if `at` was already processed.
    pub fn has_seen(&self, at: C) -> bool {
        self.last_seen.map_or(false, |seen| at <= seen)
    }

    /// True if processing has reached `tail`. An empty tail is always reached.
    pub fn reached(&self, tail: Option<C>) -> bool {
        match tail {
            None => true,
            Some(tail) => self.has_seen(tail),
        }
    }

    pub fn mark_seen(&mut self, at: C) {
        self.last_seen = Some(at);
    }

    pub fn mark_delivered(&mut self, at: C) {
        self.last_delivered = Some(at);
    }
}

impl<C: Copy + Ord> Default for SubscriptionState<C> {
    fn default() -> Self {
        Self::new()
    }
}
