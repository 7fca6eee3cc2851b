//! Application configuration.

use crate::error::{AppError, AppResult};
use kq_core::Product;
use kq_quoting::{EngineConfig, QuotingParams};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Topic publisher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Floor for the per-topic publish interval (ms). Default: 369.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Broadcast channel capacity. Slow subscribers lag past this. Default: 256.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_min_interval_ms() -> u64 {
    369
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Record Prometheus metrics after each quote cycle. Default: true.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Interval between run summaries in the log (seconds). Default: 3600.
    #[serde(default = "default_summary_interval_secs")]
    pub summary_interval_secs: u64,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_summary_interval_secs() -> u64 {
    3600
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
            summary_interval_secs: default_summary_interval_secs(),
        }
    }
}

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub product: Product,
    #[serde(default)]
    pub quoting: QuotingParams,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load from `KQ_CONFIG`, falling back to defaults when the file is missing.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var("KQ_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if !self.product.min_tick.is_positive() {
            return Err(AppError::Config(format!(
                "product.min_tick must be positive, got {}",
                self.product.min_tick
            )));
        }
        if !self.product.min_size.is_positive() {
            return Err(AppError::Config(format!(
                "product.min_size must be positive, got {}",
                self.product.min_size
            )));
        }
        if self.publisher.channel_capacity == 0 {
            return Err(AppError::Config(
                "publisher.channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.telemetry.summary_interval_secs == 0 {
            return Err(AppError::Config(
                "telemetry.summary_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective per-topic publish interval: `delay_ui` seconds, floored at
    /// the publisher minimum.
    pub fn publish_interval_ms(&self) -> u64 {
        publish_interval_ms(self.publisher.min_interval_ms, self.quoting.delay_ui)
    }
}

pub(crate) fn publish_interval_ms(min_interval_ms: u64, delay_ui_secs: u32) -> u64 {
    min_interval_ms.max(u64::from(delay_ui_secs) * 1000)
}
