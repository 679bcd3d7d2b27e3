//! Lightweight round-trip probes.
//!
//! A probe performs the cheapest request it can and reports whether it
//! succeeded. Timing and conversion to a rate are done by the estimator so
//! every probe is measured the same way.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::client::{BoxFuture, Query, RequestClient};

/// A single probe did not complete.
///
/// Absorbed by the estimator: the probe is excluded from averaging and the
/// failure never reaches callers of `current_tier`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbeFailure {
    #[error("probe request failed: {0}")]
    Request(String),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

/// Something that can perform one minimal round trip.
pub trait Probe: Send + Sync {
    /// Label attached to samples produced by this probe.
    fn label(&self) -> &str;

    /// Perform one round trip.
    fn round_trip(&self) -> BoxFuture<'_, Result<(), ProbeFailure>>;
}

/// Probe issuing `fetch_one` through any [`RequestClient`].
pub struct ClientProbe {
    client: Arc<dyn RequestClient>,
    resource: String,
    query: Query,
    label: String,
}

impl ClientProbe {
    pub fn new(client: Arc<dyn RequestClient>, resource: impl Into<String>, query: Query) -> Self {
        let resource = resource.into();
        Self {
            label: format!("client:{}", resource),
            client,
            resource,
            query,
        }
    }
}

impl Probe for ClientProbe {
    fn label(&self) -> &str {
        &self.label
    }

    fn round_trip(&self) -> BoxFuture<'_, Result<(), ProbeFailure>> {
        Box::pin(async move {
            self.client
                .fetch_one(&self.resource, &self.query)
                .await
                .map(|_| ())
                .map_err(|e| ProbeFailure::Request(e.to_string()))
        })
    }
}

/// Probe issuing an HTTP `HEAD` against a fixed URL.
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    label: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Result<Self, ProbeFailure> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProbeFailure::Request(format!("Failed to create HTTP client: {}", e)))?;
        let url = url.into();
        Ok(Self {
            label: format!("http:{}", url),
            client,
            url,
        })
    }
}

impl Probe for HttpProbe {
    fn label(&self) -> &str {
        &self.label
    }

    fn round_trip(&self) -> BoxFuture<'_, Result<(), ProbeFailure>> {
        Box::pin(async move {
            let response = self
                .client
                .head(&self.url)
                .send()
                .await
                .map_err(|e| ProbeFailure::Request(e.to_string()))?;
            if !response.status().is_success() {
                return Err(ProbeFailure::Request(format!(
                    "HTTP {} from {}",
                    response.status(),
                    self.url
                )));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::mock::MockRequestClient;
    use crate::client::ClientError;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Probe with a scripted sequence of outcomes, each taking a fixed time.
    pub struct ScriptedProbe {
        pub label: String,
        pub outcomes: Mutex<VecDeque<Result<Duration, ProbeFailure>>>,
        pub fallback: Result<Duration, ProbeFailure>,
    }

    impl ScriptedProbe {
        pub fn new(label: &str, fallback: Result<Duration, ProbeFailure>) -> Self {
            Self {
                label: label.to_string(),
                outcomes: Mutex::new(VecDeque::new()),
                fallback,
            }
        }

        pub fn then(self, outcome: Result<Duration, ProbeFailure>) -> Self {
            self.outcomes.lock().push_back(outcome);
            self
        }
    }

    impl Probe for ScriptedProbe {
        fn label(&self) -> &str {
            &self.label
        }

        fn round_trip(&self) -> BoxFuture<'_, Result<(), ProbeFailure>> {
            let outcome = self
                .outcomes
                .lock()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            Box::pin(async move {
                match outcome {
                    Ok(latency) => {
                        tokio::time::sleep(latency).await;
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            })
        }
    }

    #[tokio::test]
    async fn test_client_probe_success() {
        let client = Arc::new(MockRequestClient::ok(json!({"ok": true})));
        let probe = ClientProbe::new(client.clone(), "health", Query::new());
        assert_eq!(probe.label(), "client:health");
        assert!(probe.round_trip().await.is_ok());
        assert_eq!(client.fetches(), 1);
    }

    #[tokio::test]
    async fn test_client_probe_failure_maps_error() {
        let client = Arc::new(MockRequestClient::failing(ClientError::Transport(
            "offline".to_string(),
        )));
        let probe = ClientProbe::new(client, "health", Query::new());
        let err = probe.round_trip().await.unwrap_err();
        assert!(matches!(err, ProbeFailure::Request(msg) if msg.contains("offline")));
    }

    #[test]
    fn test_http_probe_label() {
        let probe = HttpProbe::new("https://example.com/ping").unwrap();
        assert_eq!(probe.label(), "http:https://example.com/ping");
    }
}
