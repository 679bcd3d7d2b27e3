//! netadapt - network-condition aware request gateway
//!
//! This library classifies the current connection into one of five
//! [`Tier`]s from timed probe round trips, and shapes outgoing work by the
//! [`TierProfile`] attached to that tier: how many duplicate reads to race,
//! how long to cache responses, how hard to retry, whether realtime streams
//! are worth opening, and what image quality to ask for.
//!
//! # Wiring
//!
//! ```no_run
//! use std::sync::Arc;
//! use netadapt::{
//!     AdaptiveGateway, ClientProbe, ConditionEstimator, ConfigFile, HttpClientConfig,
//!     HttpRequestClient, Probe, Query, RequestClient,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigFile::load()?;
//! let client: Arc<dyn RequestClient> =
//!     Arc::new(HttpRequestClient::new(HttpClientConfig::new("https://api.example.com/rest/v1"))?);
//!
//! let probe: Arc<dyn Probe> = Arc::new(ClientProbe::new(client.clone(), "health", Query::new()));
//! let estimator = Arc::new(ConditionEstimator::new(vec![probe], config.estimator.clone()));
//!
//! let gateway = AdaptiveGateway::from_config(client, estimator, &config);
//! let mood = gateway.read("moods", &Query::new().with("id", "eq.42")).await?;
//! println!("{}", mood);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod estimator;
pub mod gateway;
pub mod logging;
pub mod telemetry;
pub mod tier;

pub use cache::{CacheConfig, CacheStats};
pub use client::{
    ClientError, EventHandler, HttpClientConfig, HttpRequestClient, Query, RequestClient,
    StreamEvent, StreamId,
};
pub use config::{ConfigError, ConfigFile};
pub use estimator::{
    ClientProbe, ConditionEstimate, ConditionEstimator, EstimatorConfig, FixedTier, HttpProbe,
    Probe, TierSource,
};
pub use gateway::{AdaptiveGateway, GatewayError, GatewayResult, Subscription};
pub use logging::{init_logging, LoggingConfig};
pub use telemetry::GatewaySnapshot;
pub use tier::{PayloadQuality, ProfileTable, Tier, TierProfile};
