//! # Eventlane
//!
//! Catch-up reads and subscriptions over an append-only event store.
//!
//! ## Core Concepts
//!
//! - **Log**: Every event lives at a `Position` in the global `$all` log and
//!   at a `StreamRevision` within its stream
//! - **Catch-up**: Subscriptions read history up to the tail they observed
//!   on subscribing, then follow the live feed
//! - **Checkpoints**: Filtered `$all` subscriptions report how far they have
//!   scanned so callers can resume without rescanning
//! - **ACLs**: Read access is checked per event, so revoking it stops a
//!   running subscription at the next event
//!
//! ## Example
//!
//! ```ignore
//! use eventlane::{Engine, ExpectedRevision, NewEvent, ReadResponse, Store, StoreConfig,
//!     StreamSubscriptionRequest};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let store = Arc::new(Store::open_or_create(StoreConfig::at("./my-store"))?);
//! store.append("orders", ExpectedRevision::Any, vec![
//!     NewEvent::json("OrderPlaced", &json!({ "id": 1 }))?,
//! ])?;
//!
//! let engine = Engine::for_store(store);
//! let subscription = engine.subscribe_to_stream(StreamSubscriptionRequest {
//!     stream: "orders".into(),
//!     ..Default::default()
//! })?;
//! for response in subscription {
//!     match response? {
//!         ReadResponse::Event(event) => println!("{}", event.event.event_type),
//!         ReadResponse::CaughtUp => println!("live"),
//!         _ => {}
//!     }
//! }
//! ```

pub mod acl;
pub mod cancel;
pub mod config;
pub mod enumerators;
pub mod error;
pub mod filter;
pub mod live;
pub mod metadata;
pub mod reader;
pub mod records;
pub mod store;
pub mod streams;
pub mod types;

// Re-exports
pub use acl::{
    AccessChecker, AccessKind, AclAccessChecker, Operation, Principal, StreamAcl, SystemSettings,
};
pub use cancel::CancellationToken;
pub use config::{EnumeratorOptions, StoreConfig};
pub use enumerators::{
    AllSubscription, AllSubscriptionRequest, Engine, FailureReason, Phase, ReadAll,
    ReadAllRequest, ReadResponse, ReadStream, ReadStreamRequest, StreamSubscription,
    StreamSubscriptionRequest, SubscriptionState,
};
pub use error::{Result, StoreError};
pub use filter::{EventFilter, FilterContext, FilterKind};
pub use live::{FeedScope, LiveBus, LiveFeed, LiveMessage, LiveSubscription};
pub use metadata::StreamMetadata;
pub use reader::{HistoricalReader, ReadAllPage, ReadDirection, ReadOptions, ReadStreamPage};
pub use records::{EventLog, StreamIndex, StreamStatus};
pub use store::Store;
pub use types::*;
