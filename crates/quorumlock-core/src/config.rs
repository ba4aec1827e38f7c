//! Configuration model
//!
//! Supplied once at construction and treated as immutable afterwards.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LockError, Result};
use crate::retry::{ExponentialBackoff, FixedDelay, RandomDelay, RetryPolicy};

/// Lock manager settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// TTL used by `acquire_default`, in milliseconds
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,
    /// Retries after the first attempt used by `acquire_default`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fraction of the TTL deducted for clock drift between caller and stores
    #[serde(default = "default_drift_factor")]
    pub drift_factor: f64,
    /// Constant deducted on top of the drift fraction, in milliseconds
    #[serde(default = "default_drift_constant_ms")]
    pub drift_constant_ms: u64,
    /// Prepended to lock names to form the store key
    #[serde(default)]
    pub key_prefix: String,
    /// Backoff between attempts
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_ttl_ms() -> u64 {
    8000
}

fn default_max_retries() -> u32 {
    31
}

fn default_drift_factor() -> f64 {
    0.01
}

fn default_drift_constant_ms() -> u64 {
    2
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: default_ttl_ms(),
            max_retries: default_max_retries(),
            drift_factor: default_drift_factor(),
            drift_constant_ms: default_drift_constant_ms(),
            key_prefix: String::new(),
            retry: RetryConfig::default(),
        }
    }
}

impl LockConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn drift_constant(&self) -> Duration {
        Duration::from_millis(self.drift_constant_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_ttl_ms == 0 {
            return Err(LockError::Config(
                "default_ttl_ms must be greater than zero".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.drift_factor) {
            return Err(LockError::Config(format!(
                "drift_factor must be in [0, 1), got {}",
                self.drift_factor
            )));
        }
        self.retry.validate()
    }
}

/// Retry strategy selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryConfig {
    /// Uniform random delay between bounds
    Random {
        #[serde(default = "default_random_min_ms")]
        min_delay_ms: u64,
        #[serde(default = "default_random_max_ms")]
        max_delay_ms: u64,
    },
    /// Capped exponential backoff with jitter
    Exponential {
        #[serde(default = "default_initial_delay_ms")]
        initial_delay_ms: u64,
        #[serde(default = "default_max_delay_ms")]
        max_delay_ms: u64,
        #[serde(default = "default_multiplier")]
        multiplier: f64,
        #[serde(default = "default_jitter")]
        jitter: f64,
    },
    /// Constant delay
    Fixed { delay_ms: u64 },
}

fn default_random_min_ms() -> u64 {
    50
}

fn default_random_max_ms() -> u64 {
    250
}

fn default_initial_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    2000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig::Random {
            min_delay_ms: default_random_min_ms(),
            max_delay_ms: default_random_max_ms(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            RetryConfig::Exponential {
                multiplier, jitter, ..
            } => {
                if *multiplier < 1.0 {
                    return Err(LockError::Config(format!(
                        "retry multiplier must be at least 1.0, got {}",
                        multiplier
                    )));
                }
                if !(0.0..=1.0).contains(jitter) {
                    return Err(LockError::Config(format!(
                        "retry jitter must be in [0, 1], got {}",
                        jitter
                    )));
                }
                Ok(())
            }
            RetryConfig::Random { .. } | RetryConfig::Fixed { .. } => Ok(()),
        }
    }

    pub fn build(&self) -> Arc<dyn RetryPolicy> {
        match self {
            RetryConfig::Random {
                min_delay_ms,
                max_delay_ms,
            } => Arc::new(RandomDelay::new(
                Duration::from_millis(*min_delay_ms),
                Duration::from_millis(*max_delay_ms),
            )),
            RetryConfig::Exponential {
                initial_delay_ms,
                max_delay_ms,
                multiplier,
                jitter,
            } => Arc::new(ExponentialBackoff {
                initial: Duration::from_millis(*initial_delay_ms),
                max: Duration::from_millis(*max_delay_ms),
                multiplier: *multiplier,
                jitter: *jitter,
            }),
            RetryConfig::Fixed { delay_ms } => {
                Arc::new(FixedDelay(Duration::from_millis(*delay_ms)))
            }
        }
    }
}

/// One store endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Display name; defaults to the address
    #[serde(default)]
    pub name: Option<String>,
    /// Endpoint address, e.g. `redis://10.0.0.1:6379/0` or `memory://local`
    pub address: String,
    /// Per-call timeout override, in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl StoreConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

/// Store pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub stores: Vec<StoreConfig>,
    /// Per-call timeout for stores without an override, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub default_timeout_ms: u64,
}

fn default_store_timeout_ms() -> u64 {
    200
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            stores: Vec::new(),
            default_timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl PoolConfig {
    pub fn timeout_for(&self, store: &StoreConfig) -> Duration {
        Duration::from_millis(store.timeout_ms.unwrap_or(self.default_timeout_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.stores.is_empty() {
            return Err(LockError::Config("no stores configured".to_string()));
        }
        if let Some(store) = self
            .stores
            .iter()
            .find(|s| s.timeout_ms.unwrap_or(self.default_timeout_ms) == 0)
        {
            return Err(LockError::Config(format!(
                "store '{}' has a zero timeout",
                store.display_name()
            )));
        }
        Ok(())
    }
}
