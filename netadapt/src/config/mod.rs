//! INI configuration file.
//!
//! Every setting has a default, so an absent file or section is fine.
//!
//! ```ini
//! [estimator]
//! cooldown_secs = 30
//! history_capacity = 10
//! switch_confirmations = 2
//! probe_timeout_ms = 15000
//! probe_payload_megabits = 1.0
//! max_passive_samples = 32
//!
//! [cache]
//! max_entries = 10000
//!
//! [retry]
//! initial_delay_ms = 1000
//! max_delay_secs = 30
//!
//! [logging]
//! level = info
//! directory = /var/log/netadapt
//!
//! [tier.low]
//! parallelism = 2
//! timeout_ms = 25000
//! ```

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::CacheConfig;
use crate::estimator::EstimatorConfig;
use crate::gateway::BackoffConfig;
use crate::logging::LoggingConfig;
use crate::tier::{PayloadQuality, ProfileError, ProfileTable, Tier, TierProfile};

/// Directory name under the user's home directory.
pub const CONFIG_DIR_NAME: &str = ".netadapt";

/// Config file name inside [`CONFIG_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "config.ini";

const TIER_SECTION_PREFIX: &str = "tier.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid value '{value}' for {section}.{key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown tier in section [{0}]")]
    UnknownTier(String),

    #[error("home directory not found")]
    NoHomeDirectory,

    #[error(transparent)]
    Profile(#[from] ProfileError),
}

/// `~/.netadapt`
pub fn config_directory() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME))
}

/// `~/.netadapt/config.ini`
pub fn config_file_path() -> Option<PathBuf> {
    config_directory().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Parsed configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    pub estimator: EstimatorConfig,
    pub cache: CacheConfig,
    pub backoff: BackoffConfig,
    pub logging: LoggingConfig,
    pub profiles: ProfileTable,
}

impl ConfigFile {
    /// Load from the default location, or defaults when no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path().ok_or(ConfigError::NoHomeDirectory)?;
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from an explicit path. A missing file is an error here.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ini_str(&text)?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Parse INI text, applying it over the defaults.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();

        for (section, props) in ini.iter() {
            match section {
                None => {}
                Some("estimator") => apply_estimator(&mut config.estimator, props)?,
                Some("cache") => apply_cache(&mut config.cache, props)?,
                Some("retry") => apply_retry(&mut config.backoff, props)?,
                Some("logging") => apply_logging(&mut config.logging, props)?,
                Some(name) if name.starts_with(TIER_SECTION_PREFIX) => {
                    let tier_name = &name[TIER_SECTION_PREFIX.len()..];
                    let tier: Tier = tier_name
                        .parse()
                        .map_err(|_| ConfigError::UnknownTier(name.to_string()))?;
                    let mut profile = *config.profiles.get(tier);
                    apply_profile(&mut profile, name, props)?;
                    config.profiles = config.profiles.with_override(profile)?;
                }
                Some(other) => warn!(section = other, "Ignoring unknown config section"),
            }
        }

        Ok(config)
    }

    /// Render as INI. Profiles are written only where they differ from the
    /// built-in table.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some("estimator"))
            .set("cooldown_secs", self.estimator.cooldown.as_secs().to_string())
            .set("history_capacity", self.estimator.history_capacity.to_string())
            .set(
                "switch_confirmations",
                self.estimator.switch_confirmations.to_string(),
            )
            .set(
                "probe_timeout_ms",
                self.estimator.probe_timeout.as_millis().to_string(),
            )
            .set(
                "probe_payload_megabits",
                self.estimator.probe_payload_megabits.to_string(),
            )
            .set(
                "max_passive_samples",
                self.estimator.max_passive_samples.to_string(),
            );

        ini.with_section(Some("cache"))
            .set("max_entries", self.cache.max_entries.to_string());

        ini.with_section(Some("retry"))
            .set(
                "initial_delay_ms",
                self.backoff.initial_delay.as_millis().to_string(),
            )
            .set("max_delay_secs", self.backoff.max_delay.as_secs().to_string());

        let mut logging = ini.with_section(Some("logging"));
        logging.set("level", self.logging.level.clone());
        if let Some(dir) = &self.logging.directory {
            logging.set("directory", dir.display().to_string());
        }

        let defaults = ProfileTable::default();
        for profile in self.profiles.iter() {
            if profile == defaults.get(profile.tier) {
                continue;
            }
            ini.with_section(Some(format!("{}{}", TIER_SECTION_PREFIX, profile.tier.as_str())))
                .set("parallelism", profile.parallelism.to_string())
                .set("cache_ttl_ms", profile.cache_ttl_ms.to_string())
                .set("payload_quality", profile.payload_quality.to_string())
                .set("realtime_enabled", profile.realtime_enabled.to_string())
                .set("batch_size", profile.batch_size.to_string())
                .set("retry_attempts", profile.retry_attempts.to_string())
                .set("timeout_ms", profile.timeout_ms.to_string());
        }

        ini
    }

    /// Write to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }
}

/// Parse `section.key` when present.
fn parse_key<T>(props: &Properties, section: &str, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match props.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                section: section.to_string(),
                key: key.to_string(),
                value: raw.to_string(),
                reason: e.to_string(),
            }),
    }
}

fn invalid(section: &str, key: &str, value: impl Display, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn apply_estimator(config: &mut EstimatorConfig, props: &Properties) -> Result<(), ConfigError> {
    const S: &str = "estimator";
    if let Some(secs) = parse_key::<u64>(props, S, "cooldown_secs")? {
        config.cooldown = Duration::from_secs(secs);
    }
    if let Some(capacity) = parse_key::<usize>(props, S, "history_capacity")? {
        if capacity == 0 {
            return Err(invalid(S, "history_capacity", capacity, "must be at least 1"));
        }
        config.history_capacity = capacity;
    }
    if let Some(n) = parse_key::<u32>(props, S, "switch_confirmations")? {
        if n == 0 {
            return Err(invalid(S, "switch_confirmations", n, "must be at least 1"));
        }
        config.switch_confirmations = n;
    }
    if let Some(ms) = parse_key::<u64>(props, S, "probe_timeout_ms")? {
        if ms == 0 {
            return Err(invalid(S, "probe_timeout_ms", ms, "must be positive"));
        }
        config.probe_timeout = Duration::from_millis(ms);
    }
    if let Some(megabits) = parse_key::<f64>(props, S, "probe_payload_megabits")? {
        if !(megabits.is_finite() && megabits > 0.0) {
            return Err(invalid(S, "probe_payload_megabits", megabits, "must be positive"));
        }
        config.probe_payload_megabits = megabits;
    }
    if let Some(max) = parse_key::<usize>(props, S, "max_passive_samples")? {
        config.max_passive_samples = max;
    }
    warn_unknown_keys(
        S,
        props,
        &[
            "cooldown_secs",
            "history_capacity",
            "switch_confirmations",
            "probe_timeout_ms",
            "probe_payload_megabits",
            "max_passive_samples",
        ],
    );
    Ok(())
}

fn apply_cache(config: &mut CacheConfig, props: &Properties) -> Result<(), ConfigError> {
    if let Some(max) = parse_key::<u64>(props, "cache", "max_entries")? {
        config.max_entries = max;
    }
    warn_unknown_keys("cache", props, &["max_entries"]);
    Ok(())
}

fn apply_retry(config: &mut BackoffConfig, props: &Properties) -> Result<(), ConfigError> {
    if let Some(ms) = parse_key::<u64>(props, "retry", "initial_delay_ms")? {
        config.initial_delay = Duration::from_millis(ms);
    }
    if let Some(secs) = parse_key::<u64>(props, "retry", "max_delay_secs")? {
        config.max_delay = Duration::from_secs(secs);
    }
    warn_unknown_keys("retry", props, &["initial_delay_ms", "max_delay_secs"]);
    Ok(())
}

fn apply_logging(config: &mut LoggingConfig, props: &Properties) -> Result<(), ConfigError> {
    if let Some(level) = props.get("level") {
        config.level = level.trim().to_string();
    }
    if let Some(dir) = props.get("directory") {
        let dir = dir.trim();
        config.directory = (!dir.is_empty()).then(|| PathBuf::from(dir));
    }
    warn_unknown_keys("logging", props, &["level", "directory"]);
    Ok(())
}

fn apply_profile(profile: &mut TierProfile, section: &str, props: &Properties) -> Result<(), ConfigError> {
    if let Some(v) = parse_key::<u32>(props, section, "parallelism")? {
        profile.parallelism = v;
    }
    if let Some(v) = parse_key::<u64>(props, section, "cache_ttl_ms")? {
        profile.cache_ttl_ms = v;
    }
    if let Some(v) = parse_key::<PayloadQuality>(props, section, "payload_quality")? {
        profile.payload_quality = v;
    }
    if let Some(v) = parse_key::<bool>(props, section, "realtime_enabled")? {
        profile.realtime_enabled = v;
    }
    if let Some(v) = parse_key::<u32>(props, section, "batch_size")? {
        profile.batch_size = v;
    }
    if let Some(v) = parse_key::<u32>(props, section, "retry_attempts")? {
        profile.retry_attempts = v;
    }
    if let Some(v) = parse_key::<u64>(props, section, "timeout_ms")? {
        profile.timeout_ms = v;
    }
    warn_unknown_keys(
        section,
        props,
        &[
            "parallelism",
            "cache_ttl_ms",
            "payload_quality",
            "realtime_enabled",
            "batch_size",
            "retry_attempts",
            "timeout_ms",
        ],
    );
    Ok(())
}

fn warn_unknown_keys(section: &str, props: &Properties, known: &[&str]) {
    for (key, _) in props.iter() {
        if !known.contains(&key) {
            warn!(section, key, "Ignoring unknown config key");
        }
    }
}
