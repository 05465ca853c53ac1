//! Configuration for the settlement engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Settlement engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Split computation configuration
    pub split: SplitConfig,

    /// Netting configuration
    pub netting: NettingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "settlement-engine".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            split: SplitConfig::default(),
            netting: NettingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Which participants receive leftover minor units first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainderOrder {
    /// Order in which participants were supplied
    #[default]
    Supplied,
    /// Ascending user id
    UserId,
}

impl FromStr for RemainderOrder {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "supplied" => Ok(RemainderOrder::Supplied),
            "user_id" => Ok(RemainderOrder::UserId),
            other => Err(crate::Error::Config(format!(
                "Unknown remainder order '{}'",
                other
            ))),
        }
    }
}

/// Split computation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Allowed distance of a percentage split's sum from 100 (percent points)
    pub percentage_tolerance: Decimal,

    /// Tie order for leftover minor units
    pub remainder_order: RemainderOrder,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            percentage_tolerance: Decimal::ZERO,
            remainder_order: RemainderOrder::Supplied,
        }
    }
}

/// Netting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NettingConfig {
    /// Maximum users with a nonzero position in one netting run
    pub max_participants: usize,
}

impl Default for NettingConfig {
    fn default() -> Self {
        Self {
            max_participants: 10_000,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,

    /// Default level directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(tolerance) = std::env::var("SETTLE_PERCENTAGE_TOLERANCE") {
            config.split.percentage_tolerance = Decimal::from_str(&tolerance).map_err(|e| {
                crate::Error::Config(format!("Invalid SETTLE_PERCENTAGE_TOLERANCE: {}", e))
            })?;
        }

        if let Ok(order) = std::env::var("SETTLE_REMAINDER_ORDER") {
            config.split.remainder_order = order.parse()?;
        }

        if let Ok(max) = std::env::var("SETTLE_MAX_PARTICIPANTS") {
            config.netting.max_participants = max.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid SETTLE_MAX_PARTICIPANTS: {}", e))
            })?;
        }

        if let Ok(format) = std::env::var("SETTLE_LOG_FORMAT") {
            config.logging.format = match format.as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                other => {
                    return Err(crate::Error::Config(format!(
                        "Unknown log format '{}'",
                        other
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot honour
    pub fn validate(&self) -> crate::Result<()> {
        if self.split.percentage_tolerance.is_sign_negative() {
            return Err(crate::Error::Config(format!(
                "percentage_tolerance must not be negative, got {}",
                self.split.percentage_tolerance
            )));
        }
        if self.split.percentage_tolerance >= Decimal::ONE_HUNDRED {
            return Err(crate::Error::Config(format!(
                "percentage_tolerance must be below 100, got {}",
                self.split.percentage_tolerance
            )));
        }
        if self.netting.max_participants < 2 {
            return Err(crate::Error::Config(
                "max_participants must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}
