//! Probe command - measure a link and report its tier.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use netadapt::{ConditionEstimator, HttpProbe, Probe};

use crate::error::CliError;
use crate::runner::{CliRunner, RunnerOptions};

/// Arguments for the probe command.
#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// URL to time with HEAD requests (repeat for several probes)
    #[arg(long = "url", required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Number of probe rounds
    #[arg(long, default_value_t = 3)]
    pub rounds: u32,

    /// Seconds to wait between rounds
    #[arg(long, default_value_t = 2)]
    pub interval: u64,
}

/// Run the probe command.
pub fn run(options: &RunnerOptions, args: ProbeArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("probe");

    let probes = args
        .urls
        .iter()
        .map(|url| HttpProbe::new(url.as_str()).map(|p| Arc::new(p) as Arc<dyn Probe>))
        .collect::<Result<Vec<_>, _>>()?;

    // Every round should hit the network, so no cooldown here.
    let mut estimator_config = runner.config().estimator.clone();
    estimator_config.cooldown = Duration::ZERO;
    let estimator = ConditionEstimator::new(probes, estimator_config);

    let rounds = args.rounds.max(1);
    runner.block_on(async {
        for round in 1..=rounds {
            let estimate = estimator.refresh().await;
            match estimate.last_updated {
                Some(_) => println!(
                    "round {}/{}: {:>9.3} Mb/s  tier {}",
                    round, rounds, estimate.smoothed_rate_mbps, estimate.tier
                ),
                None => println!(
                    "round {}/{}: no successful probes, tier {} (default)",
                    round, rounds, estimate.tier
                ),
            }
            if round < rounds {
                tokio::time::sleep(Duration::from_secs(args.interval)).await;
            }
        }
    });

    let tier = estimator.last_known_tier();
    let profile = runner.config().profiles.get(tier);
    println!();
    println!("Tier:       {}", tier);
    println!("Parallel:   {}", profile.parallelism);
    println!("Quality:    {}", profile.payload_quality);
    println!(
        "Realtime:   {}",
        if profile.realtime_enabled { "enabled" } else { "disabled" }
    );

    Ok(())
}
