//! Enumerators: reads and catch-up subscriptions as pull-based sequences.
//!
//! A subscription first reads history up to the tail observed when it
//! registered with the live feed, reports `CaughtUp`, then follows the feed.
//! If the feed evicts notifications the subscription reports `FellBehind`
//! and catches up again from the last event it scanned. Every response is
//! pulled by a single consumer through `next_response` or `Iterator`.
//!
//! ```text
//! Initializing -> CatchingUp -> Live -> (FallingBehind -> CatchingUp -> Live)*
//!                     \____________\___________________________ Terminated
//! ```

mod all;
mod driver;
mod engine;
mod read;
mod response;
mod state;
mod stream;

pub use all::{AllSubscription, AllSubscriptionRequest};
pub use engine::Engine;
pub use read::{ReadAll, ReadAllRequest, ReadStream, ReadStreamRequest};
pub use response::{FailureReason, ReadResponse};
pub use state::{Phase, SubscriptionState};
pub use stream::{StreamSubscription, StreamSubscriptionRequest};

pub use crate::cancel::CancellationToken;
