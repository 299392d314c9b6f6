use std::collections::BTreeMap;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of in-flight queries per fan-out phase.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 16;

/// Default number of verdicts packed into one transaction.
pub const DEFAULT_BATCH_SIZE: usize = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown network '{0}'")]
    UnknownNetwork(String),

    #[error("network '{network}': {field} must be set")]
    MissingField { network: String, field: &'static str },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{0} must not be negative")]
    Negative(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub keeper: KeeperConfig,
    pub metrics: MetricsConfig,
    pub networks: BTreeMap<String, NetworkConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
    pub concurrency_limit: usize,
    pub batch_size: usize,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub requests_per_second: u32,
    pub gas_per_message: u64,
    pub gas_price: Decimal,
    pub fee_denom: String,
    pub private_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub namespace: String,
    /// When unset, counters are flushed to the log only.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NetworkConfig {
    pub lcd_url: String,
    pub chain_id: String,
    pub position_manager: String,
    pub oracle: String,
    pub keeper_address: String,
    pub tracked_assets: Vec<TrackedAsset>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackedAsset {
    pub address: String,
    pub label: String,
}

/// Policy thresholds supplied per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tolerances {
    /// Maximum relative short/long drift before a `DL` rebalance.
    pub delta: Decimal,
    /// Maximum idle-balance share of position value before a `BAL` rebalance.
    pub balance: Decimal,
    /// Maximum oracle quote age in seconds.
    pub time_secs: u64,
}

impl Tolerances {
    /// # Errors
    ///
    /// Returns an error if either ratio tolerance is negative.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delta.is_sign_negative() {
            return Err(ConfigError::Negative("delta_tolerance"));
        }
        if self.balance.is_sign_negative() {
            return Err(ConfigError::Negative("balance_tolerance"));
        }
        Ok(())
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            batch_size: DEFAULT_BATCH_SIZE,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            requests_per_second: 20,
            gas_per_message: 1_500_000,
            gas_price: Decimal::new(15, 2),
            fee_denom: "uusd".to_string(),
            private_key_env: "NEUTRAL_KEEPER_PRIVATE_KEY".to_string(),
        }
    }
}

impl KeeperConfig {
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// # Errors
    ///
    /// Returns an error if any bound that sizes a pool, batch or retry budget is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_limit == 0 {
            return Err(ConfigError::Zero("concurrency_limit"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batch_size"));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::Zero("retry_attempts"));
        }
        if self.requests_per_second == 0 {
            return Err(ConfigError::Zero("requests_per_second"));
        }
        Ok(())
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "DeltaNeutralKeeper".to_string(),
            endpoint: None,
        }
    }
}

impl AppConfig {
    /// Looks up and validates the settings for one network.
    ///
    /// # Errors
    ///
    /// Returns an error if the network is not configured or is missing a contract address.
    pub fn network(&self, name: &str) -> Result<&NetworkConfig, ConfigError> {
        let network = self
            .networks
            .get(name)
            .ok_or_else(|| ConfigError::UnknownNetwork(name.to_string()))?;
        network.validate(name)?;
        Ok(network)
    }
}

impl NetworkConfig {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let required = [
            ("lcd_url", &self.lcd_url),
            ("chain_id", &self.chain_id),
            ("position_manager", &self.position_manager),
            ("oracle", &self.oracle),
            ("keeper_address", &self.keeper_address),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    network: name.to_string(),
                    field,
                });
            }
        }
        Ok(())
    }
}
