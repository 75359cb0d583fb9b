// =============================================================================
// Tick Stream — Synthetic real-time price samples
// =============================================================================
//
// Each sample is drawn independently and uniformly from a closed bound and
// rounded to cents. The stream is infinite and cannot be restarted; it holds
// nothing but its bounds.
// =============================================================================

use chrono::Utc;
use rand::Rng;

use crate::error::ConfigError;
use crate::types::PricePoint;

/// Produces an unbounded sequence of synthetic [`PricePoint`]s.
#[derive(Debug)]
pub struct TickStream {
    min: f64,
    max: f64,
}

impl TickStream {
    /// Create a stream over the closed bound `[min, max]`.
    pub fn new(min: f64, max: f64) -> Result<Self, ConfigError> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(ConfigError::InvalidTickBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    /// Draw the next sample, stamped with the current calendar date.
    pub fn sample(&mut self) -> PricePoint {
        let raw = rand::thread_rng().gen_range(self.min..=self.max);
        PricePoint {
            time: Utc::now().date_naive(),
            value: round_cents(raw).clamp(self.min, self.max),
        }
    }
}

impl Iterator for TickStream {
    type Item = PricePoint;

    fn next(&mut self) -> Option<PricePoint> {
        Some(self.sample())
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
