pub mod historical;
pub mod store;
pub mod tick_stream;

// Re-export the core types for convenient access (e.g. `use crate::market_data::MarketDataStore`).
pub use historical::{FetcherConfig, HistoricalSeriesFetcher, SeriesSource};
pub use store::{MarketDataStore, StoreEvent, SubscriptionId};
pub use tick_stream::TickStream;
