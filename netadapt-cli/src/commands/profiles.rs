//! Profiles command - print the tier → profile table.

use netadapt::TierProfile;

use super::format_duration;
use crate::error::CliError;
use crate::runner::{load_config, RunnerOptions};

/// Run the profiles command.
pub fn run(options: &RunnerOptions, json: bool) -> Result<(), CliError> {
    let config = load_config(options)?;
    let profiles: Vec<&TierProfile> = config.profiles.iter().collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&profiles)?);
        return Ok(());
    }

    println!(
        "{:<10} {:>8} {:>9} {:>8} {:>8} {:>6} {:>7} {:>8}",
        "TIER", "PARALLEL", "CACHE", "QUALITY", "REALTIME", "BATCH", "RETRIES", "TIMEOUT"
    );
    for profile in profiles {
        let timeout = profile
            .timeout()
            .map(format_duration)
            .unwrap_or_else(|| "none".to_string());
        println!(
            "{:<10} {:>8} {:>9} {:>8} {:>8} {:>6} {:>7} {:>8}",
            profile.tier.as_str(),
            profile.parallelism,
            format_duration(profile.cache_ttl()),
            profile.payload_quality.to_string(),
            if profile.realtime_enabled { "yes" } else { "no" },
            profile.batch_size,
            profile.retry_attempts,
            timeout
        );
    }

    Ok(())
}
