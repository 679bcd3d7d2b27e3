//! Fetch command - read a resource through the adaptive gateway.

use std::sync::Arc;

use clap::Args;
use netadapt::{
    AdaptiveGateway, ClientProbe, ConditionEstimator, FixedTier, HttpClientConfig,
    HttpRequestClient, Probe, Query, RequestClient, Tier, TierSource,
};

use crate::error::CliError;
use crate::runner::{CliRunner, RunnerOptions};

/// Arguments for the fetch command.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// REST base URL, e.g. https://project.example.co/rest/v1
    #[arg(long, value_name = "URL")]
    pub base_url: String,

    /// Resource (table) to read
    #[arg(long)]
    pub resource: String,

    /// Query parameter as key=value (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// API key sent as `apikey` header and bearer token
    #[arg(long)]
    pub api_key: Option<String>,

    /// Pin the tier instead of probing (very-low, low, medium, high, very-high)
    #[arg(long)]
    pub tier: Option<Tier>,

    /// Read this many times; repeats are served from cache while fresh
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

/// Run the fetch command.
pub fn run(options: &RunnerOptions, args: FetchArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("fetch");

    let mut client_config = HttpClientConfig::new(args.base_url.as_str());
    if let Some(key) = args.api_key {
        client_config = client_config.with_api_key(key);
    }
    let client: Arc<dyn RequestClient> = Arc::new(HttpRequestClient::new(client_config)?);
    let query: Query = args.params.into_iter().collect();

    let tiers: Arc<dyn TierSource> = match args.tier {
        Some(tier) => Arc::new(FixedTier::new(tier)),
        None => {
            let probe: Arc<dyn Probe> = Arc::new(ClientProbe::new(
                client.clone(),
                args.resource.as_str(),
                query.clone(),
            ));
            Arc::new(ConditionEstimator::new(
                vec![probe],
                runner.config().estimator.clone(),
            ))
        }
    };

    let gateway = AdaptiveGateway::from_config(client, tiers, runner.config());

    runner.block_on(async {
        for _ in 0..args.repeat.max(1) {
            let value = gateway.read(&args.resource, &query).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Ok::<(), CliError>(())
    })?;

    eprintln!("tier {}: {}", gateway.last_known_tier(), gateway.metrics());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("id=eq.42"),
            Ok(("id".to_string(), "eq.42".to_string()))
        );
        assert_eq!(
            parse_param("select=*,author(name)"),
            Ok(("select".to_string(), "*,author(name)".to_string()))
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }
}
