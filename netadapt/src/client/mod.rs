//! Request client abstraction.
//!
//! The gateway talks to the outside world exclusively through
//! [`RequestClient`], a four-method contract mirroring a hosted
//! backend-as-a-service SDK: single-row reads, mutations, and realtime
//! streams. Implementations must be `Send + Sync` so one client can be shared
//! across tasks behind an `Arc<dyn RequestClient>`.
//!
//! [`HttpRequestClient`] is a generic REST + WebSocket implementation. Tests
//! use in-memory mocks.

mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use http::{HttpClientConfig, HttpRequestClient};

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callback receiving realtime events for one stream.
pub type EventHandler = Arc<dyn Fn(StreamEvent) + Send + Sync>;

/// Errors surfaced by a [`RequestClient`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// Connection or protocol failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// The attempt exceeded its time budget.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A realtime stream failed to open or broke while running.
    #[error("stream error: {0}")]
    Stream(String),
}

/// Identifier of an open realtime stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// Event delivered to a stream's [`EventHandler`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A change notification from the backend.
    Message(Value),
    /// The stream broke. Delivered at most once, after which the stream is
    /// dead and the caller is responsible for reconnecting.
    Failed(ClientError),
}

/// Ordered request parameters.
///
/// Backed by a `BTreeMap` so that the same logical parameters always render
/// to the same string, which makes it usable as part of a cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Query(BTreeMap<String, String>);

impl Query {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert or replace a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Canonical `k1=v1&k2=v2` rendering, keys in ascending order.
    ///
    /// Unescaped, so only fit for display: distinct queries can render alike.
    pub fn canonical(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// The boundary to the backing service.
///
/// The gateway assumes nothing beyond this contract: no idempotency of
/// `mutate`, no ordering between calls, and no delivery guarantees for
/// stream events.
pub trait RequestClient: Send + Sync {
    /// Fetch a single value for `resource` filtered by `query`.
    fn fetch_one<'a>(
        &'a self,
        resource: &'a str,
        query: &'a Query,
    ) -> BoxFuture<'a, Result<Value, ClientError>>;

    /// Apply `payload` to the rows of `resource` selected by `matcher`.
    fn mutate<'a>(
        &'a self,
        resource: &'a str,
        payload: &'a Value,
        matcher: &'a Query,
    ) -> BoxFuture<'a, Result<Value, ClientError>>;

    /// Open a realtime stream of changes to `resource`.
    fn open_stream<'a>(
        &'a self,
        resource: &'a str,
        handler: EventHandler,
    ) -> BoxFuture<'a, Result<StreamId, ClientError>>;

    /// Close a stream. Closing an unknown or already closed stream is a no-op.
    fn close_stream(&self, stream: StreamId);
}
