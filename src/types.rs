// =============================================================================
// Shared types used across the tickview data core
// =============================================================================

use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One real-time or historical price sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub time: NaiveDate,
    pub value: f64,
}

/// Volume aligned to the same timeline as [`PricePoint`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumePoint {
    pub time: NaiveDate,
    pub value: f64,
}

/// User-selectable display window for historical data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "3d")]
    ThreeDays,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1m")]
    OneMonth,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
}

impl Timeframe {
    /// Every selectable timeframe, in display order.
    pub const ALL: [Timeframe; 6] = [
        Self::OneDay,
        Self::ThreeDays,
        Self::OneWeek,
        Self::OneMonth,
        Self::SixMonths,
        Self::OneYear,
    ];

    /// Sampling resolution backing this timeframe.
    pub fn granularity(self) -> Granularity {
        match self {
            Self::OneDay | Self::ThreeDays => Granularity::Daily,
            Self::OneWeek | Self::OneMonth => Granularity::Weekly,
            Self::SixMonths | Self::OneYear => Granularity::Monthly,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::ThreeDays => "3d",
            Self::OneWeek => "1w",
            Self::OneMonth => "1m",
            Self::SixMonths => "6m",
            Self::OneYear => "1y",
        }
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Self::OneDay
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s.trim())
            .ok_or_else(|| ConfigError::UnknownTimeframe(s.to_string()))
    }
}

/// Underlying sampling resolution of a historical series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    /// Value of the `function` query parameter for this granularity.
    pub fn function(self) -> &'static str {
        match self {
            Self::Daily => "DIGITAL_CURRENCY_DAILY",
            Self::Weekly => "DIGITAL_CURRENCY_WEEKLY",
            Self::Monthly => "DIGITAL_CURRENCY_MONTHLY",
        }
    }

    /// Top-level response key holding the dated records.
    pub fn series_key(self) -> &'static str {
        match self {
            Self::Daily => "Time Series (Digital Currency Daily)",
            Self::Weekly => "Time Series (Digital Currency Weekly)",
            Self::Monthly => "Time Series (Digital Currency Monthly)",
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "Daily"),
            Self::Weekly => write!(f, "Weekly"),
            Self::Monthly => write!(f, "Monthly"),
        }
    }
}

/// Paired price/volume sequences produced by one historical fetch.
///
/// Both sequences share identical timestamps, strictly ascending. A dataset is
/// replaced wholesale on every fetch and never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesDataset {
    pub price_series: Vec<PricePoint>,
    pub volume_series: Vec<VolumePoint>,
}

impl SeriesDataset {
    pub fn len(&self) -> usize {
        self.price_series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.price_series.is_empty()
    }

    /// Time of the most recent point, if any.
    pub fn last_time(&self) -> Option<NaiveDate> {
        self.price_series.last().map(|p| p.time)
    }
}

/// Live, mutable state that gates rendering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StoreState {
    pub is_loading: bool,
    pub data_ready: bool,
    pub latest_tick: PricePoint,
}
