// =============================================================================
// tickview — Live chart data core
// =============================================================================
//
// Synthetic real-time ticks, historical price/volume series per timeframe, and
// the lifecycle binding that keeps a chart surface in step with both.
// =============================================================================

pub mod chart;
pub mod error;
pub mod market_data;
pub mod runtime_config;
pub mod types;

pub use error::{ConfigError, FetchError, RenderSurfaceError};
pub use types::{Granularity, PricePoint, SeriesDataset, StoreState, Timeframe, VolumePoint};
