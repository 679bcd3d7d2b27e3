//! Handle for an open realtime stream.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::client::{RequestClient, StreamId};

/// An open realtime subscription.
///
/// Closing is idempotent: the first [`close`](Subscription::close) (or the
/// drop, if `close` was never called) releases the stream, later calls do
/// nothing.
pub struct Subscription {
    client: Arc<dyn RequestClient>,
    stream: StreamId,
    resource: String,
    closed: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(client: Arc<dyn RequestClient>, stream: StreamId, resource: String) -> Self {
        Self {
            client,
            stream,
            resource,
            closed: AtomicBool::new(false),
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the stream. Safe to call any number of times.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.client.close_stream(self.stream);
        debug!(resource = %self.resource, stream = %self.stream, "Subscription closed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("stream", &self.stream)
            .field("resource", &self.resource)
            .field("closed", &self.is_closed())
            .finish()
    }
}
