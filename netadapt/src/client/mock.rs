//! Scripted in-memory client for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use super::{BoxFuture, ClientError, EventHandler, Query, RequestClient, StreamEvent, StreamId};

/// Mock client with per-method response scripts and call counters.
///
/// Scripted responses are consumed front to back; once a script is empty
/// the corresponding default is returned.
pub struct MockRequestClient {
    pub fetch_script: Mutex<VecDeque<Result<Value, ClientError>>>,
    pub fetch_default: Result<Value, ClientError>,
    pub fetch_delay: Option<Duration>,
    pub mutate_script: Mutex<VecDeque<Result<Value, ClientError>>>,
    pub mutate_default: Result<Value, ClientError>,
    pub open_result: Result<(), ClientError>,
    pub fetch_calls: AtomicUsize,
    pub mutate_calls: AtomicUsize,
    pub open_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub handlers: Mutex<Vec<EventHandler>>,
    next_stream: AtomicU64,
}

impl MockRequestClient {
    /// Every call succeeds with `value`.
    pub fn ok(value: Value) -> Self {
        Self {
            fetch_script: Mutex::new(VecDeque::new()),
            fetch_default: Ok(value.clone()),
            fetch_delay: None,
            mutate_script: Mutex::new(VecDeque::new()),
            mutate_default: Ok(value),
            open_result: Ok(()),
            fetch_calls: AtomicUsize::new(0),
            mutate_calls: AtomicUsize::new(0),
            open_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            handlers: Mutex::new(Vec::new()),
            next_stream: AtomicU64::new(1),
        }
    }

    /// Every call fails with `error`.
    pub fn failing(error: ClientError) -> Self {
        let mut mock = Self::ok(Value::Null);
        mock.fetch_default = Err(error.clone());
        mock.mutate_default = Err(error.clone());
        mock.open_result = Err(error);
        mock
    }

    pub fn script_fetch(self, responses: Vec<Result<Value, ClientError>>) -> Self {
        self.fetch_script.lock().extend(responses);
        self
    }

    pub fn script_mutate(self, responses: Vec<Result<Value, ClientError>>) -> Self {
        self.mutate_script.lock().extend(responses);
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn mutates(&self) -> usize {
        self.mutate_calls.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Deliver `event` to every handler registered through `open_stream`.
    pub fn emit(&self, event: StreamEvent) {
        for handler in self.handlers.lock().iter() {
            handler(event.clone());
        }
    }
}

impl RequestClient for MockRequestClient {
    fn fetch_one<'a>(
        &'a self,
        _resource: &'a str,
        _query: &'a Query,
    ) -> BoxFuture<'a, Result<Value, ClientError>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .fetch_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fetch_default.clone());
        let delay = self.fetch_delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            response
        })
    }

    fn mutate<'a>(
        &'a self,
        _resource: &'a str,
        _payload: &'a Value,
        _matcher: &'a Query,
    ) -> BoxFuture<'a, Result<Value, ClientError>> {
        self.mutate_calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .mutate_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.mutate_default.clone());
        Box::pin(async move { response })
    }

    fn open_stream<'a>(
        &'a self,
        _resource: &'a str,
        handler: EventHandler,
    ) -> BoxFuture<'a, Result<StreamId, ClientError>> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            self.open_result.clone()?;
            self.handlers.lock().push(handler);
            Ok(StreamId(self.next_stream.fetch_add(1, Ordering::SeqCst)))
        })
    }

    fn close_stream(&self, _stream: StreamId) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}
