// =============================================================================
// Runtime Configuration — Endpoint, tick bounds and chart settings
// =============================================================================
//
// Loaded once at startup from a JSON file. All fields carry `#[serde(default)]`
// so a partial (or empty) file still deserialises; a missing file falls back
// to defaults at the call site.
//
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::chart::{ChartConfig, Dimensions};
use crate::error::ConfigError;
use crate::market_data::FetcherConfig;
use crate::types::Timeframe;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_base_url() -> String {
    "https://www.alphavantage.co".to_string()
}

fn default_api_key() -> String {
    "demo".to_string()
}

fn default_symbol() -> String {
    "BTC".to_string()
}

fn default_market() -> String {
    "EUR".to_string()
}

fn default_tick_min() -> f64 {
    61_000.0
}

fn default_tick_max() -> f64 {
    62_000.0
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_full_screen_size() -> Dimensions {
    Dimensions {
        width: 1830,
        height: 990,
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Market data endpoint -----------------------------------------------

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Overridden by `ALPHAVANTAGE_API_KEY` when set.
    #[serde(default = "default_api_key")]
    pub api_key: String,

    /// Fixed instrument code.
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Fixed settlement currency.
    #[serde(default = "default_market")]
    pub market: String,

    /// Upper bound on a historical request. Unbounded when absent.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    // --- Synthetic ticks ----------------------------------------------------

    #[serde(default = "default_tick_min")]
    pub tick_min: f64,

    #[serde(default = "default_tick_max")]
    pub tick_max: f64,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    // --- Chart --------------------------------------------------------------

    #[serde(default)]
    pub initial_timeframe: Timeframe,

    #[serde(default)]
    pub chart: ChartConfig,

    #[serde(default = "default_full_screen_size")]
    pub full_screen_size: Dimensions,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: default_api_key(),
            symbol: default_symbol(),
            market: default_market(),
            request_timeout_secs: None,
            tick_min: default_tick_min(),
            tick_max: default_tick_max(),
            tick_interval_ms: default_tick_interval_ms(),
            initial_timeframe: Timeframe::default(),
            chart: ChartConfig::default(),
            full_screen_size: default_full_screen_size(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            market = %config.market,
            timeframe = %config.initial_timeframe,
            "runtime config loaded"
        );

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tick_min.is_finite() || !self.tick_max.is_finite() || self.tick_min > self.tick_max {
            return Err(ConfigError::InvalidTickBounds {
                min: self.tick_min,
                max: self.tick_max,
            });
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickPeriod);
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            symbol: self.symbol.clone(),
            market: self.market.clone(),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
        }
    }
}
