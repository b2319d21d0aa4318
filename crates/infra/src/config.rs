//! Runtime configuration.
//!
//! Layered with `figment`: built-in defaults, then an optional TOML file, then
//! `RETAILOPS_`-prefixed environment variables (`__` separates nested keys,
//! e.g. `RETAILOPS_SWEEPER__INTERVAL_SECS=30`).

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use retailops_approval::{DeadlinePolicy, EntityKind};
use retailops_inventory::CostingMethod;
use retailops_observability::LogSettings;

use crate::retry::{BackoffStrategy, RetryPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 5,
            max_delay_ms: 50,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            strategy: BackoffStrategy::Exponential,
            ..RetryPolicy::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperSettings {
    pub interval_secs: u64,
    pub batch_size: usize,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            interval_secs: 20,
            batch_size: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Costing method for entries created lazily by the first movement.
    pub default_costing: CostingMethod,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            default_costing: CostingMethod::WeightedAverage,
        }
    }
}

/// Top-level configuration for the ledger and approval core.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub retry: RetryConfig,
    pub sweeper: SweeperSettings,
    pub ledger: LedgerSettings,
    /// Default deadline windows in minutes, keyed by entity kind name.
    pub deadlines: BTreeMap<String, i64>,
    pub logging: LogSettings,
}

impl CoreConfig {
    pub const ENV_PREFIX: &'static str = "RETAILOPS_";

    /// Defaults merged with environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    /// Defaults, then `path` (if it exists), then environment variables.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(CoreConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"));
        Self::from_figment(figment)
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(CoreConfig::default()))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".to_string()));
        }
        if self.sweeper.interval_secs == 0 || self.sweeper.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "sweeper interval and batch size must be positive".to_string(),
            ));
        }
        for (kind, minutes) in &self.deadlines {
            kind.parse::<EntityKind>()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            if *minutes <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "deadline for {kind} must be positive"
                )));
            }
        }
        Ok(())
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sweeper(mut self, sweeper: SweeperSettings) -> Self {
        self.sweeper = sweeper;
        self
    }

    pub fn with_deadline(mut self, kind: EntityKind, minutes: i64) -> Self {
        self.deadlines.insert(kind.as_str().to_string(), minutes);
        self
    }

    /// Deadline policy built from the configured overrides (unknown kinds are skipped).
    pub fn deadline_policy(&self) -> DeadlinePolicy {
        self.deadlines
            .iter()
            .filter_map(|(k, m)| k.parse::<EntityKind>().ok().map(|k| (k, *m)))
            .fold(DeadlinePolicy::new(), |p, (kind, minutes)| {
                p.with_window(kind, chrono::Duration::minutes(minutes))
            })
    }

    /// Install the global tracing subscriber described by `logging`.
    pub fn init_logging(&self) -> bool {
        retailops_observability::subscriber::init(&self.logging)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweeper.interval_secs)
    }
}
