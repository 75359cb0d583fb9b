// =============================================================================
// Market Data Store — Process-lifetime state for the live chart
// =============================================================================
//
// Owns the loading / data-ready flags, the latest tick and the current
// historical dataset. Two independent axes drive it:
//
//   1. Historical: `get_past_data` moves Idle -> Loading -> Ready. Requests
//      are latest-wins; a response whose generation is no longer current is
//      discarded and its caller receives `FetchError::Superseded`.
//   2. Ticks: a background Tokio task pulls from the TickStream on a fixed
//      period and publishes each sample, regardless of in-flight fetches.
//
// Every mutation bumps `state_version` and notifies subscribers synchronously,
// outside of any lock, so a listener may read a fresh snapshot.
//
// Thread safety:
//   - parking_lot::RwLock for the state and dataset.
//   - Atomic counters for version, fetch generation and subscriber ids.
//   - A fetch gate mutex serializes generation bumps with the commit or
//     loading transition each one gates.
//   - The ticker task holds only a Weak reference and exits once the store is
//     disposed or dropped.
// =============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::error::FetchError;
use crate::market_data::historical::SeriesSource;
use crate::market_data::tick_stream::TickStream;
use crate::types::{PricePoint, SeriesDataset, StoreState, Timeframe};

/// Change notification delivered to every subscriber.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// `is_loading` flipped.
    Loading(bool),
    /// A fetch for `timeframe` succeeded and replaced the dataset. Implies
    /// `data_ready == true`.
    DatasetCommitted {
        timeframe: Timeframe,
        dataset: Arc<SeriesDataset>,
    },
    /// A new latest tick was published.
    Tick(PricePoint),
}

/// Handle returned by [`MarketDataStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

// =============================================================================
// Shared inner state
// =============================================================================

struct StoreInner {
    state: RwLock<StoreState>,
    dataset: RwLock<Option<(Timeframe, Arc<SeriesDataset>)>>,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
    /// Bumped on every mutation.
    state_version: AtomicU64,
    /// Generation of the most recent `get_past_data` call.
    fetch_generation: AtomicU64,
    /// Held across every generation bump or compare and the loading
    /// transition it gates. Never held while listeners run.
    fetch_gate: Mutex<()>,
    disposed: AtomicBool,
}

impl StoreInner {
    fn notify(&self, event: StoreEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    fn bump_version(&self) {
        self.state_version.fetch_add(1, Ordering::SeqCst);
    }

    /// Flip `is_loading` without notifying. Returns whether it changed.
    fn store_loading(&self, loading: bool) -> bool {
        {
            let mut state = self.state.write();
            if state.is_loading == loading {
                return false;
            }
            state.is_loading = loading;
        }
        self.bump_version();
        true
    }

    /// Start a new fetch generation and raise the loading flag.
    fn begin_fetch(&self) -> u64 {
        let (generation, changed) = {
            let _gate = self.fetch_gate.lock();
            let generation = self.fetch_generation.fetch_add(1, Ordering::SeqCst) + 1;
            (generation, self.store_loading(true))
        };
        if changed {
            self.notify(StoreEvent::Loading(true));
        }
        generation
    }

    /// Settle a finished fetch. Only the current generation may commit or
    /// clear the loading flag.
    fn finish_fetch(
        &self,
        generation: u64,
        timeframe: Timeframe,
        result: Result<SeriesDataset, FetchError>,
    ) -> Result<Arc<SeriesDataset>, FetchError> {
        let gate = self.fetch_gate.lock();
        if self.disposed.load(Ordering::SeqCst) {
            debug!(timeframe = %timeframe, "store disposed during fetch — dropping response");
            return Err(FetchError::Disposed);
        }
        if self.fetch_generation.load(Ordering::SeqCst) != generation {
            debug!(timeframe = %timeframe, generation, "superseded response discarded");
            return Err(FetchError::Superseded(timeframe));
        }

        match result {
            Ok(dataset) => {
                let dataset = Arc::new(dataset);
                let was_loading = self.store_commit(timeframe, Arc::clone(&dataset));
                drop(gate);
                info!(timeframe = %timeframe, points = dataset.len(), "historical dataset committed");
                self.notify(StoreEvent::DatasetCommitted {
                    timeframe,
                    dataset: Arc::clone(&dataset),
                });
                if was_loading {
                    self.notify(StoreEvent::Loading(false));
                }
                Ok(dataset)
            }
            Err(e) => {
                let changed = self.store_loading(false);
                drop(gate);
                warn!(timeframe = %timeframe, error = %e, "historical fetch failed");
                if changed {
                    self.notify(StoreEvent::Loading(false));
                }
                Err(e)
            }
        }
    }

    /// Clear the loading flag of a fetch whose future was dropped before it
    /// resolved, unless a newer fetch has taken over.
    fn abandon_fetch(&self, generation: u64) {
        let changed = {
            let _gate = self.fetch_gate.lock();
            if self.fetch_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            self.store_loading(false)
        };
        if changed {
            debug!(generation, "in-flight fetch cancelled — loading cleared");
            self.notify(StoreEvent::Loading(false));
        }
    }

    /// Replace the dataset and mark data ready. Returns the previous
    /// `is_loading`.
    fn store_commit(&self, timeframe: Timeframe, dataset: Arc<SeriesDataset>) -> bool {
        *self.dataset.write() = Some((timeframe, dataset));
        let was_loading = {
            let mut state = self.state.write();
            let was_loading = state.is_loading;
            state.is_loading = false;
            state.data_ready = true;
            was_loading
        };
        self.bump_version();
        was_loading
    }

    fn publish_tick(&self, point: PricePoint) {
        self.state.write().latest_tick = point;
        self.bump_version();
        trace!(value = point.value, time = %point.time, "tick");
        self.notify(StoreEvent::Tick(point));
    }
}

/// Lives for the duration of one `get_past_data` call. If the call is
/// cancelled mid-fetch, dropping it releases the loading flag.
struct FetchGuard {
    inner: Arc<StoreInner>,
    generation: u64,
    settled: bool,
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.inner.abandon_fetch(self.generation);
        }
    }
}

// =============================================================================
// MarketDataStore
// =============================================================================

/// Owns [`StoreState`] and the one [`TickStream`], and orchestrates historical
/// fetches through a [`SeriesSource`].
///
/// Must be created inside a Tokio runtime. Dropping the store disposes it.
pub struct MarketDataStore {
    inner: Arc<StoreInner>,
    source: Arc<dyn SeriesSource>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl MarketDataStore {
    /// Create the store and start its tick process.
    ///
    /// The first tick is drawn synchronously so `latest_tick` is populated
    /// before the timer ever fires.
    pub fn create(source: Arc<dyn SeriesSource>, mut ticks: TickStream, tick_period: Duration) -> Self {
        let first = ticks.sample();
        let inner = Arc::new(StoreInner {
            state: RwLock::new(StoreState {
                is_loading: false,
                data_ready: false,
                latest_tick: first,
            }),
            dataset: RwLock::new(None),
            listeners: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            state_version: AtomicU64::new(1),
            fetch_generation: AtomicU64::new(0),
            fetch_gate: Mutex::new(()),
            disposed: AtomicBool::new(false),
        });

        let ticker = spawn_ticker(Arc::downgrade(&inner), ticks, tick_period);
        info!(
            period_ms = u64::try_from(tick_period.as_millis()).unwrap_or(u64::MAX),
            initial = first.value,
            "market data store created"
        );

        Self {
            inner,
            source,
            ticker: Mutex::new(Some(ticker)),
        }
    }

    /// Fetch and commit the historical dataset for `timeframe`.
    ///
    /// `is_loading` is true while the request is the current one and is
    /// cleared on success, on failure, or when the returned future is dropped
    /// mid-fetch. A failure leaves `data_ready` and the previous dataset
    /// untouched.
    pub async fn get_past_data(&self, timeframe: Timeframe) -> Result<Arc<SeriesDataset>, FetchError> {
        if self.is_disposed() {
            return Err(FetchError::Disposed);
        }

        let generation = self.inner.begin_fetch();
        let mut guard = FetchGuard {
            inner: Arc::clone(&self.inner),
            generation,
            settled: false,
        };
        info!(
            timeframe = %timeframe,
            granularity = %timeframe.granularity(),
            generation,
            "fetching historical series"
        );

        let result = self.source.fetch(timeframe).await;
        guard.settled = true;
        self.inner.finish_fetch(generation, timeframe, result)
    }

    /// Register a listener invoked synchronously on every state change.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.write().push((id, Arc::new(listener)));
        debug!(subscription = id.0, "store subscriber added");
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    pub fn snapshot(&self) -> StoreState {
        *self.inner.state.read()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.read().is_loading
    }

    pub fn data_ready(&self) -> bool {
        self.inner.state.read().data_ready
    }

    pub fn latest_tick(&self) -> PricePoint {
        self.inner.state.read().latest_tick
    }

    /// The most recently committed dataset and the timeframe it was fetched for.
    pub fn current_dataset(&self) -> Option<(Timeframe, Arc<SeriesDataset>)> {
        self.inner.dataset.read().clone()
    }

    pub fn state_version(&self) -> u64 {
        self.inner.state_version.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Stop the tick process and drop every subscriber. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.ticker.lock().take() {
            handle.abort();
        }
        self.inner.listeners.write().clear();
        {
            let _gate = self.inner.fetch_gate.lock();
            self.inner.store_loading(false);
        }
        info!("market data store disposed");
    }
}

impl Drop for MarketDataStore {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Spawn the fixed-cadence tick loop. The first timer tick fires one period
/// after creation; the initial sample was already taken synchronously.
fn spawn_ticker(inner: Weak<StoreInner>, mut ticks: TickStream, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            timer.tick().await;
            let Some(inner) = inner.upgrade() else { break };
            if inner.disposed.load(Ordering::SeqCst) {
                break;
            }
            inner.publish_tick(ticks.sample());
        }
        debug!("tick loop stopped");
    })
}

// =============================================================================
// Tests
// =============================================================================
