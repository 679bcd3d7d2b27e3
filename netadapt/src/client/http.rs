//! REST + WebSocket implementation of [`RequestClient`].
//!
//! Maps the four-method contract onto a conventional REST backend:
//!
//! | Operation     | Request                                      |
//! |---------------|----------------------------------------------|
//! | `fetch_one`   | `GET {base}/{resource}?{query}`              |
//! | `mutate`      | `PATCH {base}/{resource}?{match}` JSON body  |
//! | `open_stream` | WebSocket `{ws_base}/{resource}`             |
//!
//! Each open stream is served by a reader task that forwards text frames to
//! the stream's handler and stops when its `CancellationToken` fires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{BoxFuture, ClientError, EventHandler, Query, RequestClient, StreamEvent, StreamId};

/// Default timeout for a single HTTP request (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connection settings for [`HttpRequestClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// REST root, e.g. `https://project.example.com/rest/v1`.
    pub base_url: String,
    /// WebSocket root. Derived from `base_url` when `None`.
    pub ws_url: Option<String>,
    /// Sent as both `apikey` and bearer token when present.
    pub api_key: Option<String>,
    /// Hard ceiling for any request, independent of tier timeouts.
    pub request_timeout: Duration,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ws_url: None,
            api_key: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    fn resource_url(&self, resource: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            resource.trim_start_matches('/')
        )
    }

    fn stream_url(&self, resource: &str) -> String {
        let root = match &self.ws_url {
            Some(url) => url.clone(),
            None => {
                if let Some(rest) = self.base_url.strip_prefix("https://") {
                    format!("wss://{}", rest)
                } else if let Some(rest) = self.base_url.strip_prefix("http://") {
                    format!("ws://{}", rest)
                } else {
                    self.base_url.clone()
                }
            }
        };
        format!(
            "{}/{}",
            root.trim_end_matches('/'),
            resource.trim_start_matches('/')
        )
    }
}

/// Generic REST client built on `reqwest`.
pub struct HttpRequestClient {
    client: reqwest::Client,
    config: HttpClientConfig,
    streams: DashMap<u64, CancellationToken>,
    next_stream: AtomicU64,
}

impl HttpRequestClient {
    /// Create a client for the given configuration.
    pub fn new(config: HttpClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            streams: DashMap::new(),
            next_stream: AtomicU64::new(1),
        })
    }

    /// Number of streams currently open.
    pub fn open_streams(&self) -> usize {
        self.streams.len()
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout(self.config.request_timeout)
        } else {
            ClientError::Transport(format!("Request failed: {}", e))
        }
    }

    async fn decode(&self, response: reqwest::Response) -> Result<Value, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

/// Collapse a row-set response to the single row a `fetch_one` asks for.
fn first_row(value: Value) -> Value {
    match value {
        Value::Array(mut rows) => {
            if rows.is_empty() {
                Value::Null
            } else {
                rows.swap_remove(0)
            }
        }
        other => other,
    }
}

fn query_pairs(query: &Query) -> Vec<(&str, &str)> {
    query.iter().collect()
}

impl RequestClient for HttpRequestClient {
    fn fetch_one<'a>(
        &'a self,
        resource: &'a str,
        query: &'a Query,
    ) -> BoxFuture<'a, Result<Value, ClientError>> {
        Box::pin(async move {
            let url = self.config.resource_url(resource);
            let request = self.authorize(self.client.get(&url).query(&query_pairs(query)));
            let response = request.send().await.map_err(|e| self.map_reqwest_error(e))?;
            self.decode(response).await.map(first_row)
        })
    }

    fn mutate<'a>(
        &'a self,
        resource: &'a str,
        payload: &'a Value,
        matcher: &'a Query,
    ) -> BoxFuture<'a, Result<Value, ClientError>> {
        Box::pin(async move {
            let url = self.config.resource_url(resource);
            let request = self.authorize(
                self.client
                    .patch(&url)
                    .query(&query_pairs(matcher))
                    .header("Prefer", "return=representation")
                    .json(payload),
            );
            let response = request.send().await.map_err(|e| self.map_reqwest_error(e))?;
            self.decode(response).await
        })
    }

    fn open_stream<'a>(
        &'a self,
        resource: &'a str,
        handler: EventHandler,
    ) -> BoxFuture<'a, Result<StreamId, ClientError>> {
        Box::pin(async move {
            let url = self.config.stream_url(resource);
            let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| ClientError::Stream(format!("connect {}: {}", url, e)))?;

            let id = self.next_stream.fetch_add(1, Ordering::Relaxed);
            let token = CancellationToken::new();
            self.streams.insert(id, token.clone());
            debug!(stream = id, url = %url, "Realtime stream opened");

            tokio::spawn(async move {
                let (mut sink, mut source) = socket.split();
                loop {
                    tokio::select! {
                        _ = token.cancelled() => {
                            let _ = sink.send(Message::Close(None)).await;
                            debug!(stream = id, "Realtime stream closed by caller");
                            break;
                        }
                        frame = source.next() => match frame {
                            Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                                Ok(value) => handler(StreamEvent::Message(value)),
                                Err(e) => {
                                    warn!(stream = id, error = %e, "Dropping undecodable stream frame");
                                }
                            },
                            Some(Ok(Message::Close(_))) | None => {
                                handler(StreamEvent::Failed(ClientError::Stream(
                                    "closed by server".to_string(),
                                )));
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                handler(StreamEvent::Failed(ClientError::Stream(e.to_string())));
                                break;
                            }
                        }
                    }
                }
            });

            Ok(StreamId(id))
        })
    }

    fn close_stream(&self, stream: StreamId) {
        if let Some((_, token)) = self.streams.remove(&stream.0) {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_url_joins_cleanly() {
        let config = HttpClientConfig::new("https://api.example.com/rest/v1/");
        assert_eq!(
            config.resource_url("/profiles"),
            "https://api.example.com/rest/v1/profiles"
        );
    }

    #[test]
    fn test_stream_url_derived_from_base() {
        let config = HttpClientConfig::new("https://api.example.com/rest/v1");
        assert_eq!(
            config.stream_url("messages"),
            "wss://api.example.com/rest/v1/messages"
        );

        let plain = HttpClientConfig::new("http://localhost:8080");
        assert_eq!(plain.stream_url("messages"), "ws://localhost:8080/messages");
    }

    #[test]
    fn test_stream_url_explicit() {
        let config = HttpClientConfig::new("https://api.example.com")
            .with_ws_url("wss://realtime.example.com/socket/");
        assert_eq!(
            config.stream_url("moods"),
            "wss://realtime.example.com/socket/moods"
        );
    }

    #[test]
    fn test_first_row_collapses_arrays() {
        assert_eq!(first_row(json!([{"id": 1}, {"id": 2}])), json!({"id": 1}));
        assert_eq!(first_row(json!([])), Value::Null);
        assert_eq!(first_row(json!({"id": 3})), json!({"id": 3}));
    }

    #[test]
    fn test_close_unknown_stream_is_noop() {
        let client = HttpRequestClient::new(HttpClientConfig::new("http://localhost")).unwrap();
        client.close_stream(StreamId(42));
        client.close_stream(StreamId(42));
        assert_eq!(client.open_streams(), 0);
    }
}
