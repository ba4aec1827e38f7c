//! Command line and configuration loading
//!
//! Sources, lowest precedence first:
//! 1. `conf/quorumlock.yml` (or `--config`), optional
//! 2. `QUORUMLOCK_*` environment variables, `__` separating nested keys,
//!    e.g. `QUORUMLOCK_LOCK__DEFAULT_TTL_MS=5000`
//! 3. command line flags

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File};
use quorumlock_core::{LockConfig, PoolConfig, StoreConfig};

use crate::startup::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/quorumlock.yml";

/// Quorum-based distributed lock client
#[derive(Debug, Parser)]
#[command(name = "quorumlock", version)]
pub struct Cli {
    /// Configuration file
    #[arg(short = 'c', long = "config", env = "QUORUMLOCK_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Store address, repeatable; replaces the configured stores
    #[arg(short = 's', long = "store")]
    pub stores: Vec<String>,

    /// Prefix prepended to lock names
    #[arg(long = "key-prefix")]
    pub key_prefix: Option<String>,

    /// Per-store call timeout in milliseconds
    #[arg(long = "timeout-ms")]
    pub timeout_ms: Option<u64>,

    /// Log at debug level
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Acquire a lock and leave it to expire
    Acquire(AcquireArgs),
    /// Release a lock by token
    Release {
        name: String,
        #[arg(long)]
        token: String,
    },
    /// Acquire, keep alive for a while, then release
    Hold {
        #[command(flatten)]
        acquire: AcquireArgs,
        /// How long to hold the lock, in milliseconds
        #[arg(long = "for-ms")]
        for_ms: u64,
    },
    /// Show each store's value for a lock
    Status { name: String },
    /// Check that every store answers
    Ping,
}

#[derive(Debug, Clone, Args)]
pub struct AcquireArgs {
    pub name: String,
    /// Lock TTL in milliseconds (default from configuration)
    #[arg(long = "ttl-ms")]
    pub ttl_ms: Option<u64>,
    /// Retries after the first attempt (default from configuration)
    #[arg(long = "retries")]
    pub retries: Option<u32>,
    /// Give up after this many milliseconds
    #[arg(long = "wait-ms")]
    pub wait_ms: Option<u64>,
}

/// Application configuration loaded from file, environment and flags
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
    stores_override: Vec<String>,
}

impl Configuration {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::from(cli.config.clone()).required(false))
            .add_source(
                Environment::with_prefix("QUORUMLOCK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(prefix) = &cli.key_prefix {
            builder = builder.set_override("lock.key_prefix", prefix.as_str())?;
        }
        if let Some(timeout) = cli.timeout_ms {
            builder = builder.set_override("pool.default_timeout_ms", timeout)?;
        }
        if cli.verbose {
            builder = builder.set_override("logging.level", "debug")?;
        }

        Ok(Configuration {
            config: builder.build()?,
            stores_override: cli.stores.clone(),
        })
    }

    pub fn lock_config(&self) -> anyhow::Result<LockConfig> {
        let lock = match self.config.get::<LockConfig>("lock") {
            Ok(lock) => lock,
            Err(config::ConfigError::NotFound(_)) => LockConfig::default(),
            Err(e) => return Err(e.into()),
        };
        lock.validate()?;
        Ok(lock)
    }

    pub fn pool_config(&self) -> anyhow::Result<PoolConfig> {
        let mut pool = match self.config.get::<PoolConfig>("pool") {
            Ok(pool) => pool,
            Err(config::ConfigError::NotFound(_)) => PoolConfig::default(),
            Err(e) => return Err(e.into()),
        };
        if !self.stores_override.is_empty() {
            pool.stores = self
                .stores_override
                .iter()
                .map(|address| StoreConfig {
                    name: None,
                    address: address.clone(),
                    timeout_ms: None,
                })
                .collect();
        }
        Ok(pool)
    }

    pub fn logging_config(&self) -> LoggingConfig {
        let level = self
            .config
            .get_string("logging.level")
            .unwrap_or_else(|_| "warn".to_string());
        let rotation = self.config.get_string("logging.rotation").ok();
        LoggingConfig::from_config(
            self.config.get_string("logging.dir").ok(),
            self.config.get_bool("logging.console").unwrap_or(true),
            self.config.get_bool("logging.file").unwrap_or(false),
            &level,
            rotation.as_deref(),
        )
        .with_env()
    }
}
