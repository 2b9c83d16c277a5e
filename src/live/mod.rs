//! Live feed of newly committed events.
//!
//! Subscribers register with a [`FeedScope`] and receive notifications in
//! commit order through a bounded buffer. A subscriber that cannot keep up
//! loses its oldest buffered notifications and sees `missed = true` on the
//! next one it receives; it never gets dropped silently.

mod bus;
mod types;

pub use bus::{LiveBus, LiveSubscription};
pub use types::{
    FeedScope, LiveMessage, LiveRecv, LiveSubscriptionId, Notification, SubscriptionConfirmation,
};

use crate::error::Result;

/// Publish/subscribe source of committed events.
pub trait LiveFeed: Send + Sync {
    /// Register for live notifications.
    ///
    /// The confirmation's tail is observed atomically with registration:
    /// every event after it is delivered to the returned subscription.
    fn subscribe(&self, scope: FeedScope) -> Result<(LiveSubscription, SubscriptionConfirmation)>;
}
