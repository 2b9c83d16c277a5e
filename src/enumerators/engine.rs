//! Builds enumerators over a shared set of collaborators.

use super::all::{AllSubscription, AllSubscriptionRequest};
use super::read::{ReadAll, ReadAllRequest, ReadStream, ReadStreamRequest};
use super::stream::{StreamSubscription, StreamSubscriptionRequest};
use crate::acl::AccessChecker;
use crate::config::EnumeratorOptions;
use crate::error::{Result, StoreError};
use crate::live::LiveFeed;
use crate::reader::HistoricalReader;
use crate::store::Store;
use crate::streams;
use std::sync::Arc;

/// Entry point for reads and subscriptions.
///
/// Cheap to clone; every enumerator it builds holds its own handles to the
/// collaborators and shares no other state.
#[derive(Clone)]
pub struct Engine {
    reader: Arc<dyn HistoricalReader>,
    feed: Arc<dyn LiveFeed>,
    access: Arc<dyn AccessChecker>,
    options: EnumeratorOptions,
}

impl Engine {
    pub fn new(
        reader: Arc<dyn HistoricalReader>,
        feed: Arc<dyn LiveFeed>,
        access: Arc<dyn AccessChecker>,
        options: EnumeratorOptions,
    ) -> Self {
        Self {
            reader,
            feed,
            access,
            options,
        }
    }

    /// Engine reading, following and authorizing through one store.
    pub fn for_store(store: Arc<Store>) -> Self {
        Self::for_store_with_options(store, EnumeratorOptions::default())
    }

    pub fn for_store_with_options(store: Arc<Store>, options: EnumeratorOptions) -> Self {
        Self::new(store.clone(), store.clone(), store, options)
    }

    pub fn options(&self) -> &EnumeratorOptions {
        &self.options
    }

    pub fn subscribe_to_all(&self, request: AllSubscriptionRequest) -> AllSubscription {
        AllSubscription::new(
            self.reader.clone(),
            self.feed.clone(),
            self.access.clone(),
            &self.options,
            request,
        )
    }

    pub fn subscribe_to_stream(
        &self,
        request: StreamSubscriptionRequest,
    ) -> Result<StreamSubscription> {
        validate_stream_name(&request.stream)?;
        Ok(StreamSubscription::new(
            self.reader.clone(),
            self.feed.clone(),
            self.access.clone(),
            &self.options,
            request,
        ))
    }

    pub fn read_all(&self, request: ReadAllRequest) -> ReadAll {
        ReadAll::new(
            self.reader.clone(),
            self.access.clone(),
            &self.options,
            request,
        )
    }

    pub fn read_stream(&self, request: ReadStreamRequest) -> Result<ReadStream> {
        validate_stream_name(&request.stream)?;
        Ok(ReadStream::new(
            self.reader.clone(),
            self.access.clone(),
            &self.options,
            request,
        ))
    }
}

fn validate_stream_name(stream: &str) -> Result<()> {
    if stream.is_empty() || stream == streams::ALL {
        return Err(StoreError::InvalidStreamName(stream.to_string()));
    }
    Ok(())
}
