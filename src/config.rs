//! Runtime configuration.
//!
//! All environment variable reads happen here.

use std::path::PathBuf;

use thiserror::Error;

use crate::Points;

/// Starting balance for accounts opened without an explicit amount.
pub const DEFAULT_BALANCE: u64 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Replay and sweeper settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Balance given by `open` rows that carry no amount (`WAGER_DEFAULT_BALANCE`).
    pub default_balance: Points,
    /// Run an expiry sweep before every replayed row (`WAGER_SWEEP_EACH_ROW`).
    /// When off, lapsed offers are only expired lazily on read.
    pub sweep_each_row: bool,
    /// Where to write the final wager table, if anywhere (`WAGER_DUMP_PATH`).
    pub dump_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_balance: Points::new(DEFAULT_BALANCE),
            sweep_each_row: true,
            dump_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(value) = lookup("WAGER_DEFAULT_BALANCE") {
            let balance = value
                .trim()
                .parse::<u64>()
                .map_err(|e| invalid("WAGER_DEFAULT_BALANCE", &value, e))?;
            config.default_balance = Points::new(balance);
        }

        if let Some(value) = lookup("WAGER_SWEEP_EACH_ROW") {
            config.sweep_each_row = parse_bool("WAGER_SWEEP_EACH_ROW", &value)?;
        }

        config.dump_path = lookup("WAGER_DUMP_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, value, "expected a boolean")),
    }
}
