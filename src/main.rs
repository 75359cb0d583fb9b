// =============================================================================
// tickview — Headless runner
// =============================================================================
//
// Wires config -> fetcher -> store -> chart binding, loads the initial
// timeframe and keeps the live tick flowing until Ctrl+C.
// =============================================================================

use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tickview::chart::{ChartBinding, Dimensions, HeadlessContainer};
use tickview::market_data::{HistoricalSeriesFetcher, MarketDataStore, TickStream};
use tickview::runtime_config::RuntimeConfig;

/// Interval between status lines.
const STATUS_INTERVAL_SECS: u64 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("TICKVIEW_CONFIG").unwrap_or_else(|_| "tickview.json".into());
    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    if let Ok(key) = std::env::var("ALPHAVANTAGE_API_KEY") {
        if !key.trim().is_empty() {
            config.api_key = key;
        }
    }
    config.validate().context("invalid runtime config")?;

    info!(
        symbol = %config.symbol,
        market = %config.market,
        timeframe = %config.initial_timeframe,
        "tickview starting"
    );

    // ── 2. Market data store ─────────────────────────────────────────────
    let fetcher = HistoricalSeriesFetcher::new(config.fetcher_config())
        .context("failed to build market data client")?;
    let ticks = TickStream::new(config.tick_min, config.tick_max)?;
    let store = Arc::new(MarketDataStore::create(
        Arc::new(fetcher),
        ticks,
        config.tick_period(),
    ));

    // ── 3. Chart binding ─────────────────────────────────────────────────
    let windowed: Dimensions = config.chart.options.dimensions();
    let container = HeadlessContainer::new(windowed, config.full_screen_size);
    let binding = Arc::new(Mutex::new(ChartBinding::new(
        container,
        config.chart.clone(),
        config.initial_timeframe,
    )));

    let sink = Arc::clone(&binding);
    let subscription = store.subscribe(move |event| sink.lock().handle_event(event));

    // ── 4. Initial historical load ───────────────────────────────────────
    match store.get_past_data(config.initial_timeframe).await {
        Ok(dataset) => info!(
            timeframe = %config.initial_timeframe,
            points = dataset.len(),
            "initial dataset loaded"
        ),
        Err(e) => error!(
            error = %e,
            "initial fetch failed — chart stays on its loading placeholder"
        ),
    }

    // ── 5. Status loop ───────────────────────────────────────────────────
    let status_store = Arc::clone(&store);
    let status_binding = Arc::clone(&binding);
    let status = tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(STATUS_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let state = status_store.snapshot();
            let (placeholder, points) = {
                let b = status_binding.lock();
                (b.shows_placeholder(), b.container().snapshot().price.len())
            };
            info!(
                latest = state.latest_tick.value,
                data_ready = state.data_ready,
                loading = state.is_loading,
                placeholder,
                points,
                "status"
            );
        }
    });

    info!("Live chart running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    status.abort();
    store.unsubscribe(subscription);
    store.dispose();
    binding.lock().unmount();

    info!("tickview shut down complete.");
    Ok(())
}
