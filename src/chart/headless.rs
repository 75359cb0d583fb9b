// =============================================================================
// Headless Chart — In-memory container and surface
// =============================================================================
//
// Keeps what a real renderer would draw (series contents, size, fit calls) in
// a shared `SurfaceSnapshot` so the runner can report it and tests can
// inspect it.
// =============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::chart::surface::{ChartConfig, ChartContainer, ChartSurface, Dimensions};
use crate::error::RenderSurfaceError;
use crate::types::{PricePoint, VolumePoint};

/// What the most recent surface currently shows, plus lifecycle counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceSnapshot {
    pub config: Option<ChartConfig>,
    pub price: Vec<PricePoint>,
    pub volume: Vec<VolumePoint>,
    pub dimensions: Option<Dimensions>,
    pub fit_count: u32,
    pub created: u32,
    pub removed: u32,
    /// A surface exists and has not been removed.
    pub live: bool,
}

pub struct HeadlessContainer {
    windowed: Dimensions,
    full_screen_size: Dimensions,
    full_screen: bool,
    attached: bool,
    shared: Arc<RwLock<SurfaceSnapshot>>,
}

impl HeadlessContainer {
    pub fn new(windowed: Dimensions, full_screen_size: Dimensions) -> Self {
        Self {
            windowed,
            full_screen_size,
            full_screen: false,
            attached: true,
            shared: Arc::new(RwLock::new(SurfaceSnapshot::default())),
        }
    }

    /// Simulate the host element being removed from the layout.
    pub fn detach(&mut self) {
        self.attached = false;
    }

    pub fn attach(&mut self) {
        self.attached = true;
    }

    pub fn snapshot(&self) -> SurfaceSnapshot {
        self.shared.read().clone()
    }
}

impl ChartContainer for HeadlessContainer {
    fn measure(&self) -> Option<Dimensions> {
        if !self.attached {
            return None;
        }
        Some(if self.full_screen {
            self.full_screen_size
        } else {
            self.windowed
        })
    }

    fn create_surface(
        &mut self,
        config: &ChartConfig,
    ) -> Result<Box<dyn ChartSurface>, RenderSurfaceError> {
        if !self.attached {
            return Err(RenderSurfaceError::ContainerNotMounted);
        }
        {
            let mut snap = self.shared.write();
            snap.config = Some(config.clone());
            snap.price.clear();
            snap.volume.clear();
            snap.dimensions = Some(config.options.dimensions());
            snap.created += 1;
            snap.live = true;
        }
        debug!(size = %config.options.dimensions(), "headless surface created");
        Ok(Box::new(HeadlessSurface {
            shared: Arc::clone(&self.shared),
            removed: false,
        }))
    }

    fn set_full_screen(&mut self, full_screen: bool) {
        self.full_screen = full_screen;
    }
}

struct HeadlessSurface {
    shared: Arc<RwLock<SurfaceSnapshot>>,
    removed: bool,
}

impl ChartSurface for HeadlessSurface {
    fn set_price_data(&mut self, points: &[PricePoint]) {
        if !self.removed {
            self.shared.write().price = points.to_vec();
        }
    }

    fn set_volume_data(&mut self, points: &[VolumePoint]) {
        if !self.removed {
            self.shared.write().volume = points.to_vec();
        }
    }

    fn update_price(&mut self, point: PricePoint) {
        if self.removed {
            return;
        }
        let mut snap = self.shared.write();
        if let Some(last) = snap.price.last_mut() {
            if last.time == point.time {
                last.value = point.value;
                trace!(value = point.value, "trailing point updated");
                return;
            }
        }
        snap.price.push(point);
        trace!(value = point.value, "point appended");
    }

    fn resize(&mut self, dimensions: Dimensions) {
        if !self.removed {
            self.shared.write().dimensions = Some(dimensions);
        }
    }

    fn fit_content(&mut self) {
        if !self.removed {
            self.shared.write().fit_count += 1;
        }
    }

    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        let mut snap = self.shared.write();
        snap.price.clear();
        snap.volume.clear();
        snap.removed += 1;
        snap.live = false;
        debug!("headless surface removed");
    }
}
