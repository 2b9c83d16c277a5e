//! Fan-out of committed events to live subscribers.

use crate::cancel::CancellationToken;
use crate::types::ResolvedEvent;
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

use super::types::{FeedScope, LiveMessage, LiveRecv, LiveSubscriptionId, Notification};

/// Internal subscriber state.
struct Subscriber {
    scope: FeedScope,
    sender: Sender<Notification>,
    /// Receiver clone used to drop the oldest message on overflow.
    evictor: Receiver<Notification>,
    next_sequence: AtomicU64,
}

impl Subscriber {
    /// Send a message, evicting the oldest buffered one if the buffer is full.
    fn deliver(&self, id: LiveSubscriptionId, message: LiveMessage) {
        let notification = Notification {
            sequence: self.next_sequence.fetch_add(1, Ordering::SeqCst),
            message,
        };

        match self.sender.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(notification)) => {
                let evicted = self.evictor.try_recv().ok().map(|n| n.sequence);
                warn!(subscription = ?id, evicted = ?evicted, "live buffer full, evicting oldest notification");
                if let Err(e) = self.sender.try_send(notification) {
                    // The consumer sees the gap in sequence numbers either way.
                    trace!(subscription = ?id, error = %e, "dropped live notification");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                trace!(subscription = ?id, "live subscriber disconnected");
            }
        }
    }

    fn wants_event(&self, event: &ResolvedEvent, visible_in_stream: bool) -> bool {
        match &self.scope {
            FeedScope::All => event.original_position().is_some(),
            FeedScope::Stream(stream) => {
                visible_in_stream && event.original_stream_id() == stream.as_str()
            }
        }
    }

    fn wants_metadata_change(&self, changed: Option<&str>) -> bool {
        match (&self.scope, changed) {
            (FeedScope::All, _) => false,
            (FeedScope::Stream(_), None) => true,
            (FeedScope::Stream(stream), Some(changed)) => stream == changed,
        }
    }
}

/// Broadcasts committed events to live subscribers.
///
/// Each subscriber has a bounded buffer. A slow subscriber is never
/// dropped: its oldest notification is evicted instead, and it detects the
/// loss from the gap in sequence numbers.
pub struct LiveBus {
    /// Active subscribers by ID.
    subscribers: RwLock<HashMap<LiveSubscriptionId, Subscriber>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    buffer_size: usize,
}

impl LiveBus {
    /// Default per-subscriber buffer.
    pub const DEFAULT_BUFFER_SIZE: usize = 1024;

    pub fn new(buffer_size: usize) -> Arc<Self> {
        Arc::new(Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer_size: buffer_size.max(1),
        })
    }

    /// Register a subscriber.
    pub fn subscribe(self: &Arc<Self>, scope: FeedScope) -> LiveSubscription {
        let id = LiveSubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(self.buffer_size);

        let subscriber = Subscriber {
            scope: scope.clone(),
            sender,
            evictor: receiver.clone(),
            next_sequence: AtomicU64::new(0),
        };
        self.subscribers.write().insert(id, subscriber);
        trace!(subscription = ?id, scope = ?scope, "live subscriber registered");

        LiveSubscription {
            id,
            scope,
            receiver,
            last_sequence: None,
            bus: Arc::downgrade(self),
        }
    }

    /// Remove a subscriber. Idempotent.
    pub fn unsubscribe(&self, id: LiveSubscriptionId) {
        if self.subscribers.write().remove(&id).is_some() {
            trace!(subscription = ?id, "live subscriber removed");
        }
    }

    /// Get subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Publish a committed event.
    ///
    /// `visible_in_stream` is false when stream truncation already hides
    /// the event from readers of its stream.
    pub fn publish_event(&self, event: &ResolvedEvent, visible_in_stream: bool) {
        self.broadcast(
            |sub| sub.wants_event(event, visible_in_stream),
            || LiveMessage::Event(event.clone()),
        );
    }

    /// Publish a metadata or ACL change. `None` means `$settings`.
    pub fn publish_metadata_changed(&self, stream: Option<&str>) {
        self.broadcast(
            |sub| sub.wants_metadata_change(stream),
            || LiveMessage::MetadataChanged {
                stream: stream.map(str::to_string),
            },
        );
    }

    /// Internal broadcast helper.
    fn broadcast<F, M>(&self, filter: F, message: M)
    where
        F: Fn(&Subscriber) -> bool,
        M: Fn() -> LiveMessage,
    {
        let subs = self.subscribers.read();
        for (id, sub) in subs.iter() {
            if filter(sub) {
                sub.deliver(*id, message());
            }
        }
    }
}

/// Receiving end of a live subscription. Dropping it unsubscribes.
pub struct LiveSubscription {
    id: LiveSubscriptionId,
    scope: FeedScope,
    receiver: Receiver<Notification>,
    last_sequence: Option<u64>,
    bus: Weak<LiveBus>,
}

impl LiveSubscription {
    pub fn id(&self) -> LiveSubscriptionId {
        self.id
    }

    pub fn scope(&self) -> &FeedScope {
        &self.scope
    }

    /// Wait for the next message or for cancellation.
    pub fn recv(&mut self, cancel: &CancellationToken) -> LiveRecv {
        if cancel.is_cancelled() {
            return LiveRecv::Cancelled;
        }

        let received = select! {
            recv(self.receiver) -> msg => Some(msg),
            recv(cancel.receiver()) -> _ => None,
        };

        match received {
            Some(Ok(notification)) => self.accept(notification),
            Some(Err(_)) => LiveRecv::Closed,
            None => LiveRecv::Cancelled,
        }
    }

    /// Wait up to `timeout` for the next message. `None` on timeout.
    #[cfg(test)]
    pub(crate) fn recv_timeout(&mut self, timeout: std::time::Duration) -> Option<LiveRecv> {
        use crossbeam_channel::RecvTimeoutError;

        match self.receiver.recv_timeout(timeout) {
            Ok(notification) => Some(self.accept(notification)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(LiveRecv::Closed),
        }
    }

    fn accept(&mut self, notification: Notification) -> LiveRecv {
        let expected = self.last_sequence.map(|s| s + 1).unwrap_or(0);
        let missed = notification.sequence != expected;
        self.last_sequence = Some(notification.sequence);
        LiveRecv::Message {
            message: notification.message,
            missed,
        }
    }

    /// Stop receiving. Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
        self.bus = Weak::new();
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
