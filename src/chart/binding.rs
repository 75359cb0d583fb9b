// =============================================================================
// Chart Binding — Lifecycle manager between the store and a chart surface
// =============================================================================
//
// Owns one surface (with its price-area and volume-histogram series) and the
// selected timeframe. Reacts to store events, container resizes and
// full-screen toggles:
//
//   - Construction happens once the store has committed its first dataset.
//   - A change of config or timeframe tears the surface down and rebuilds it
//     from scratch; series are never partially reconfigured.
//   - Dataset commits replace both series and re-fit the time range.
//   - Ticks touch only the price series, and only while data is ready and no
//     fetch is in flight.
//   - A failed construction is not retried until the next dependency change.
//
// Every method is idempotent and safe to call in any lifecycle state.
// =============================================================================

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, trace, warn};

use crate::chart::surface::{ChartConfig, ChartContainer, ChartSurface, Dimensions};
use crate::error::RenderSurfaceError;
use crate::market_data::StoreEvent;
use crate::types::{PricePoint, SeriesDataset, Timeframe};

struct MountedChart {
    surface: Box<dyn ChartSurface>,
    /// Time of the last point in the price series.
    trailing: Option<NaiveDate>,
}

pub struct ChartBinding<C: ChartContainer> {
    container: C,
    config: ChartConfig,
    timeframe: Timeframe,
    full_screen: bool,
    data_ready: bool,
    loading: bool,
    /// Most recent committed dataset and the timeframe it belongs to.
    dataset: Option<(Timeframe, Arc<SeriesDataset>)>,
    chart: Option<MountedChart>,
}

impl<C: ChartContainer> ChartBinding<C> {
    pub fn new(container: C, config: ChartConfig, timeframe: Timeframe) -> Self {
        Self {
            container,
            config,
            timeframe,
            full_screen: false,
            data_ready: false,
            loading: false,
            dataset: None,
            chart: None,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn container(&self) -> &C {
        &self.container
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn is_mounted(&self) -> bool {
        self.chart.is_some()
    }

    pub fn is_full_screen(&self) -> bool {
        self.full_screen
    }

    /// Whether the chart area should show its loading placeholder.
    pub fn shows_placeholder(&self) -> bool {
        !self.data_ready || self.loading || self.chart.is_none()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Construct the surface if data is ready and nothing is mounted yet.
    ///
    /// Before the first dataset commit this is a no-op. A construction failure
    /// is returned and not retried.
    pub fn mount(&mut self) -> Result<(), RenderSurfaceError> {
        if self.chart.is_some() {
            return Ok(());
        }
        if !self.data_ready {
            debug!("chart mount deferred until data is ready");
            return Ok(());
        }

        let mut surface = self.container.create_surface(&self.config)?;
        if let Some(dims) = self.container.measure() {
            surface.resize(dims);
        }
        surface.fit_content();
        self.chart = Some(MountedChart {
            surface,
            trailing: None,
        });
        info!(timeframe = %self.timeframe, "chart surface mounted");

        if let Some((tf, dataset)) = self.dataset.clone() {
            if tf == self.timeframe {
                self.load(&dataset);
            }
        }
        Ok(())
    }

    /// Release the surface and detach from container resizes. Idempotent.
    pub fn unmount(&mut self) {
        if let Some(mut chart) = self.chart.take() {
            chart.surface.remove();
            info!("chart surface unmounted");
        }
    }

    fn rebuild(&mut self) {
        self.unmount();
        if let Err(e) = self.mount() {
            warn!(error = %e, "chart reconstruction failed — waiting for next change");
        }
    }

    /// Apply a new visual config; rebuilds only when it differs.
    pub fn set_config(&mut self, config: ChartConfig) {
        if config == self.config {
            return;
        }
        self.config = config;
        self.rebuild();
    }

    /// Select a timeframe. Returns `true` when it changed, in which case the
    /// surface has been rebuilt empty and the caller should fetch the new
    /// timeframe's dataset.
    pub fn select_timeframe(&mut self, timeframe: Timeframe) -> bool {
        if timeframe == self.timeframe {
            return false;
        }
        info!(from = %self.timeframe, to = %timeframe, "timeframe selected");
        self.timeframe = timeframe;
        self.rebuild();
        true
    }

    // -------------------------------------------------------------------------
    // Data
    // -------------------------------------------------------------------------

    /// Take a committed dataset. Mounts on first availability; otherwise
    /// replaces both series if the dataset belongs to the selected timeframe.
    pub fn update_dataset(&mut self, timeframe: Timeframe, dataset: Arc<SeriesDataset>) {
        self.data_ready = true;
        self.dataset = Some((timeframe, Arc::clone(&dataset)));

        if self.chart.is_none() {
            if let Err(e) = self.mount() {
                warn!(error = %e, "chart construction failed — waiting for next change");
            }
            return;
        }
        if timeframe != self.timeframe {
            debug!(dataset = %timeframe, selected = %self.timeframe, "dataset for another timeframe ignored");
            return;
        }
        self.load(&dataset);
    }

    fn load(&mut self, dataset: &SeriesDataset) {
        let Some(chart) = self.chart.as_mut() else { return };
        chart.surface.set_price_data(&dataset.price_series);
        chart.surface.set_volume_data(&dataset.volume_series);
        chart.surface.fit_content();
        chart.trailing = dataset.last_time();
        debug!(points = dataset.len(), "series replaced");
    }

    /// Push a live tick into the trailing point of the price series.
    ///
    /// Returns `true` if the surface was updated. Ticks before data is ready,
    /// during a fetch, without a surface, or older than the trailing point are
    /// dropped.
    pub fn apply_tick(&mut self, point: PricePoint) -> bool {
        if !self.data_ready || self.loading {
            trace!(value = point.value, "tick dropped — data not ready");
            return false;
        }
        let Some(chart) = self.chart.as_mut() else {
            return false;
        };
        if chart.trailing.is_some_and(|t| point.time < t) {
            trace!(time = %point.time, "tick older than trailing point dropped");
            return false;
        }
        chart.surface.update_price(point);
        chart.trailing = Some(point.time);
        true
    }

    // -------------------------------------------------------------------------
    // Layout
    // -------------------------------------------------------------------------

    pub fn resize(&mut self, dimensions: Dimensions) {
        if let Some(chart) = self.chart.as_mut() {
            chart.surface.resize(dimensions);
            debug!(dimensions = %dimensions, "chart resized");
        }
    }

    /// Resize listener: re-apply the container's measured size to the surface.
    pub fn on_container_resized(&mut self) {
        if let Some(dims) = self.container.measure() {
            self.resize(dims);
        }
    }

    /// Toggle full-screen layout. Only the container's size changes; the
    /// series are kept.
    pub fn set_full_screen(&mut self, full_screen: bool) {
        if full_screen == self.full_screen {
            return;
        }
        self.full_screen = full_screen;
        self.container.set_full_screen(full_screen);
        self.on_container_resized();
    }

    // -------------------------------------------------------------------------
    // Store wiring
    // -------------------------------------------------------------------------

    /// Route a store notification to the matching binding operation.
    pub fn handle_event(&mut self, event: &StoreEvent) {
        match event {
            StoreEvent::Loading(loading) => self.loading = *loading,
            StoreEvent::DatasetCommitted { timeframe, dataset } => {
                self.update_dataset(*timeframe, Arc::clone(dataset));
            }
            StoreEvent::Tick(point) => {
                self.apply_tick(*point);
            }
        }
    }
}

impl<C: ChartContainer> Drop for ChartBinding<C> {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures_util::future::{BoxFuture, FutureExt};
    use parking_lot::Mutex;
    use tokio::sync::oneshot;

    use crate::chart::headless::HeadlessContainer;
    use crate::error::FetchError;
    use crate::market_data::{MarketDataStore, SeriesSource, TickStream};
    use crate::types::VolumePoint;

    const WINDOWED: Dimensions = Dimensions { width: 1000, height: 500 };
    const FULL: Dimensions = Dimensions { width: 1830, height: 990 };

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn dataset(closes: &[f64]) -> Arc<SeriesDataset> {
        let mut ds = SeriesDataset::default();
        for (i, &c) in closes.iter().enumerate() {
            let time = day(i as u32 + 1);
            ds.price_series.push(PricePoint { time, value: c });
            ds.volume_series.push(VolumePoint { time, value: c * 2.0 });
        }
        Arc::new(ds)
    }

    fn binding() -> ChartBinding<HeadlessContainer> {
        ChartBinding::new(
            HeadlessContainer::new(WINDOWED, FULL),
            ChartConfig::default(),
            Timeframe::OneDay,
        )
    }

    #[test]
    fn mount_waits_for_data_ready() {
        let mut b = binding();
        b.mount().unwrap();
        assert!(!b.is_mounted());
        assert!(b.shows_placeholder());
        assert_eq!(b.container().snapshot().created, 0);
    }

    #[test]
    fn first_dataset_constructs_and_loads() {
        let mut b = binding();
        b.update_dataset(Timeframe::OneDay, dataset(&[1.0, 2.0, 3.0]));
        assert!(b.is_mounted());
        assert!(!b.shows_placeholder());

        let snap = b.container().snapshot();
        assert_eq!(snap.created, 1);
        assert_eq!(snap.price.len(), 3);
        assert_eq!(snap.volume.len(), 3);
        assert_eq!(snap.dimensions, Some(WINDOWED));
        assert!(snap.fit_count >= 1);
    }

    #[test]
    fn ticks_before_data_ready_are_noops() {
        let mut b = binding();
        let tick = PricePoint { time: day(3), value: 42.0 };
        assert!(!b.apply_tick(tick));

        b.update_dataset(Timeframe::OneDay, dataset(&[1.0, 2.0]));
        assert_eq!(b.container().snapshot().price.len(), 2);

        assert!(b.apply_tick(tick));
        let snap = b.container().snapshot();
        assert_eq!(snap.price.len(), 3);
        assert_eq!(snap.price.last(), Some(&tick));
        assert_eq!(snap.volume.len(), 2);
    }

    #[test]
    fn tick_on_trailing_date_updates_in_place() {
        let mut b = binding();
        b.update_dataset(Timeframe::OneDay, dataset(&[1.0, 2.0]));
        assert!(b.apply_tick(PricePoint { time: day(2), value: 9.5 }));
        let snap = b.container().snapshot();
        assert_eq!(snap.price.len(), 2);
        assert_eq!(snap.price[1].value, 9.5);
    }

    #[test]
    fn stale_tick_is_dropped() {
        let mut b = binding();
        b.update_dataset(Timeframe::OneDay, dataset(&[1.0, 2.0, 3.0]));
        assert!(!b.apply_tick(PricePoint { time: day(1), value: 7.0 }));
        assert_eq!(b.container().snapshot().price[0].value, 1.0);
    }

    #[test]
    fn ticks_dropped_while_loading() {
        let mut b = binding();
        b.update_dataset(Timeframe::OneDay, dataset(&[1.0]));
        b.handle_event(&StoreEvent::Loading(true));
        b.handle_event(&StoreEvent::Tick(PricePoint { time: day(5), value: 1.0 }));
        assert_eq!(b.container().snapshot().price.len(), 1);
        b.handle_event(&StoreEvent::Loading(false));
        b.handle_event(&StoreEvent::Tick(PricePoint { time: day(5), value: 1.0 }));
        assert_eq!(b.container().snapshot().price.len(), 2);
    }

    #[test]
    fn new_dataset_replaces_series() {
        let mut b = binding();
        b.update_dataset(Timeframe::OneDay, dataset(&[1.0, 2.0, 3.0]));
        b.update_dataset(Timeframe::OneDay, dataset(&[4.0]));
        let snap = b.container().snapshot();
        assert_eq!(snap.created, 1);
        assert_eq!(snap.price.len(), 1);
        assert_eq!(snap.price[0].value, 4.0);
    }

    #[test]
    fn timeframe_change_rebuilds_empty_surface() {
        let mut b = binding();
        b.update_dataset(Timeframe::OneDay, dataset(&[1.0, 2.0]));
        assert!(!b.select_timeframe(Timeframe::OneDay));

        assert!(b.select_timeframe(Timeframe::OneYear));
        let snap = b.container().snapshot();
        assert_eq!(snap.created, 2);
        assert_eq!(snap.removed, 1);
        assert!(snap.price.is_empty());

        // A late dataset for the old timeframe is not drawn.
        b.update_dataset(Timeframe::OneDay, dataset(&[8.0]));
        assert!(b.container().snapshot().price.is_empty());

        b.update_dataset(Timeframe::OneYear, dataset(&[5.0, 6.0]));
        assert_eq!(b.container().snapshot().price.len(), 2);
    }

    #[test]
    fn config_change_rebuilds_and_restores_data() {
        let mut b = binding();
        b.update_dataset(Timeframe::OneDay, dataset(&[1.0, 2.0]));

        b.set_config(ChartConfig::default());
        assert_eq!(b.container().snapshot().created, 1);

        let mut config = ChartConfig::default();
        config.price_style.line_color = "#ff0000".into();
        b.set_config(config.clone());
        let snap = b.container().snapshot();
        assert_eq!(snap.created, 2);
        assert_eq!(snap.removed, 1);
        assert_eq!(snap.price.len(), 2);
        assert_eq!(snap.config, Some(config));
    }

    #[test]
    fn full_screen_resizes_without_rebuilding() {
        let mut b = binding();
        b.update_dataset(Timeframe::OneDay, dataset(&[1.0, 2.0]));

        b.set_full_screen(true);
        let snap = b.container().snapshot();
        assert_eq!(snap.dimensions, Some(FULL));
        assert_eq!(snap.created, 1);
        assert_eq!(snap.price.len(), 2);

        b.set_full_screen(false);
        assert_eq!(b.container().snapshot().dimensions, Some(WINDOWED));
    }

    #[test]
    fn construction_failure_waits_for_next_change() {
        let mut b = binding();
        b.container.detach();
        b.update_dataset(Timeframe::OneDay, dataset(&[1.0]));
        assert!(!b.is_mounted());
        assert!(b.shows_placeholder());

        // Re-attaching alone does not trigger a retry.
        b.container.attach();
        assert!(!b.is_mounted());

        b.update_dataset(Timeframe::OneDay, dataset(&[1.0, 2.0]));
        assert!(b.is_mounted());
        assert_eq!(b.container().snapshot().price.len(), 2);
    }

    #[test]
    fn unmount_is_idempotent_and_safe_before_mount() {
        let mut b = binding();
        b.unmount();
        b.update_dataset(Timeframe::OneDay, dataset(&[1.0]));
        b.unmount();
        b.unmount();
        let snap = b.container().snapshot();
        assert_eq!(snap.removed, 1);
        assert!(!snap.live);
        b.resize(FULL);
        assert!(!b.apply_tick(PricePoint { time: day(9), value: 1.0 }));
    }

    /// Source whose single response is released by the test.
    struct GatedSource {
        pending: Mutex<Option<oneshot::Receiver<SeriesDataset>>>,
    }

    impl SeriesSource for GatedSource {
        fn fetch(&self, _timeframe: Timeframe) -> BoxFuture<'_, Result<SeriesDataset, FetchError>> {
            let rx = self.pending.lock().take();
            async move {
                match rx {
                    Some(rx) => rx.await.map_err(|_| FetchError::Disposed),
                    None => Err(FetchError::Disposed),
                }
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn store_subscription_drives_binding() {
        let (tx, rx) = oneshot::channel();
        let source = Arc::new(GatedSource {
            pending: Mutex::new(Some(rx)),
        });
        let store = Arc::new(MarketDataStore::create(
            source,
            TickStream::new(61_000.0, 62_000.0).unwrap(),
            Duration::from_secs(1),
        ));
        let chart = Arc::new(Mutex::new(binding()));
        let sink = Arc::clone(&chart);
        store.subscribe(move |event| sink.lock().handle_event(event));

        // Two ticks before any dataset.
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        {
            let b = chart.lock();
            assert!(!b.is_mounted());
            assert!(b.shows_placeholder());
            assert_eq!(b.container().snapshot().created, 0);
        }

        // One tick while the fetch is in flight.
        let fetch = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.get_past_data(Timeframe::OneDay).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(chart.lock().shows_placeholder());
        assert!(!chart.lock().is_mounted());

        tx.send((*dataset(&[1.0, 2.0, 3.0])).clone()).unwrap();
        fetch.await.unwrap().unwrap();
        {
            let b = chart.lock();
            assert!(b.is_mounted());
            assert!(!b.shows_placeholder());
            assert_eq!(b.container().snapshot().price.len(), 3);
        }

        // First tick appends today's point, the next one overwrites it.
        tokio::time::sleep(Duration::from_secs(2)).await;
        let snap = chart.lock().container().snapshot();
        assert_eq!(snap.created, 1);
        assert_eq!(snap.price.len(), 4);
        assert_eq!(snap.volume.len(), 3);
        assert_eq!(snap.price.last().copied(), Some(store.latest_tick()));
    }
}
