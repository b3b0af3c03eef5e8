//! Command-line interface parsing for the quotecache diagnostics tool
//!
//! This module handles parsing of CLI arguments using clap and merges the
//! global flags over the config file into a [`StartupConfig`].

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

use crate::cache::TierKind;
use crate::config::{CacheConfig, ConfigError};
use crate::logging::{LogConfig, LogFormat};

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified tier name is not recognized
    #[error("Invalid tier: '{0}'. Valid tiers: memory, disk, archive")]
    InvalidTier(String),

    /// The specified log format is not recognized
    #[error("Invalid log format: '{0}'. Valid formats: pretty, json, compact")]
    InvalidLogFormat(String),

    /// The value given to `put` is not JSON
    #[error("Value is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The config file could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No --cache-dir, no cache_dir in the config and no XDG cache directory
    #[error("Could not determine a cache directory; pass --cache-dir")]
    NoCacheDir,
}

/// quotecache - inspect and maintain the tiered quote cache
#[derive(Parser, Debug)]
#[command(name = "quotecache")]
#[command(about = "Inspect and maintain the tiered quote cache")]
#[command(version)]
pub struct Cli {
    /// Root directory for the disk and archive tiers
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// TOML config file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "quotecache=debug"
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log output format: pretty, json, compact
    #[arg(long, global = true, value_name = "FORMAT", value_parser = parse_log_format_arg)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print cache statistics as JSON
    Stats,

    /// Print the cached JSON value for KEY (exits 1 on a miss)
    Get { key: String },

    /// Store a JSON value under KEY
    ///
    /// Examples:
    ///   quotecache put quote:AAPL '{"price": 190.1}'
    ///   quotecache put watchlist '["AAPL","MSFT"]' --tier archive
    Put {
        key: String,
        value: String,
        /// Tier to write to instead of the key-based default
        #[arg(long, value_parser = parse_tier_arg)]
        tier: Option<TierKind>,
    },

    /// Remove KEY from every tier
    Remove { key: String },

    /// Remove every entry and reset statistics
    Clear,

    /// Run one cleanup pass and print what it did
    Cleanup,

    /// Read quote-script output from stdin, cache the quotes and print each symbol's status
    ParseQuotes,
}

/// Parses a tier name argument.
///
/// # Arguments
/// * `s` - The tier string from CLI
///
/// # Returns
/// * `Ok(TierKind)` if the string names a tier
/// * `Err(CliError::InvalidTier)` if it doesn't
pub fn parse_tier_arg(s: &str) -> Result<TierKind, CliError> {
    s.parse().map_err(|_| CliError::InvalidTier(s.to_string()))
}

/// Parses a log format argument.
pub fn parse_log_format_arg(s: &str) -> Result<LogFormat, CliError> {
    s.parse().map_err(|_| CliError::InvalidLogFormat(s.to_string()))
}

/// Parses the JSON given to `put`.
pub fn parse_json_arg(s: &str) -> Result<serde_json::Value, CliError> {
    Ok(serde_json::from_str(s)?)
}

/// Settings resolved from the config file and CLI flags
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub cache: CacheConfig,
    pub cache_dir: PathBuf,
    pub logging: LogConfig,
}

impl StartupConfig {
    /// Loads the config file (if any) and applies CLI overrides.
    ///
    /// # Arguments
    /// * `cli` - The parsed CLI struct
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with flags taking precedence over the file
    /// * `Err(CliError)` if the config is unreadable or no cache directory is known
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let cache = match &cli.config {
            Some(path) => CacheConfig::load(path)?,
            None => CacheConfig::default(),
        };

        let cache_dir = match &cli.cache_dir {
            Some(dir) => dir.clone(),
            None => cache.resolve_cache_dir().ok_or(CliError::NoCacheDir)?,
        };

        let mut logging = LogConfig::from_config(&cache.logging);
        if let Some(level) = &cli.log_level {
            logging = logging.with_level(level.clone());
        }
        if let Some(format) = cli.log_format {
            logging = logging.with_format(format);
        }

        Ok(Self {
            cache,
            cache_dir,
            logging,
        })
    }
}
