//! Gateway error types.

use thiserror::Error;

use crate::client::ClientError;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failures surfaced to callers of [`AdaptiveGateway`](super::AdaptiveGateway).
///
/// A realtime subscription refused because the active profile disables
/// realtime is not an error: `subscribe_if_allowed` returns `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// Every attempt allowed by the active profile failed.
    #[error("{operation} on '{resource}' failed after {attempts} attempt(s): {source}")]
    ExhaustedRetries {
        operation: &'static str,
        resource: String,
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        source: ClientError,
    },

    /// Opening a realtime stream was attempted and failed. Not retried.
    #[error("subscription to '{resource}' failed: {source}")]
    SubscriptionFailed {
        resource: String,
        #[source]
        source: ClientError,
    },
}

impl GatewayError {
    /// The underlying client error.
    pub fn client_error(&self) -> &ClientError {
        match self {
            GatewayError::ExhaustedRetries { source, .. } => source,
            GatewayError::SubscriptionFailed { source, .. } => source,
        }
    }
}
