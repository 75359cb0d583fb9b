// =============================================================================
// Error taxonomy
// =============================================================================

use thiserror::Error;

use crate::types::Timeframe;

/// Failure of a historical fetch. Surfaces to the caller of
/// `MarketDataStore::get_past_data`; no state is partially applied.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("market data endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("market data provider error: {0}")]
    Provider(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("fetch for {0} superseded by a newer request")]
    Superseded(Timeframe),
    #[error("store disposed before the fetch completed")]
    Disposed,
}

/// Chart surface construction failure. Local to the chart binding.
#[derive(Debug, Error)]
pub enum RenderSurfaceError {
    #[error("chart container is not mounted")]
    ContainerNotMounted,
    #[error("chart surface construction failed: {0}")]
    Construction(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid tick bounds [{min}, {max}]")]
    InvalidTickBounds { min: f64, max: f64 },
    #[error("tick period must be non-zero")]
    ZeroTickPeriod,
    #[error("unknown timeframe: {0}")]
    UnknownTimeframe(String),
}
