// =============================================================================
// Chart Surface Contract — What the binding needs from a rendering engine
// =============================================================================
//
// The core depends only on these traits. A surface renders one price-area
// series and one volume-histogram overlay; a container measures itself and
// constructs surfaces.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::RenderSurfaceError;
use crate::types::{PricePoint, VolumePoint};

/// Pixel size of a container or surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrosshairMode {
    Normal,
    Magnet,
}

fn default_width() -> u32 {
    1000
}

fn default_height() -> u32 {
    500
}

fn default_background() -> String {
    "#FFFFFF".to_string()
}

fn default_font_size() -> u32 {
    24
}

fn default_font_family() -> String {
    "Roboto".to_string()
}

fn default_true() -> bool {
    true
}

fn default_crosshair() -> CrosshairMode {
    CrosshairMode::Magnet
}

/// Visual options for the surface as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartOptions {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_background")]
    pub background: String,
    #[serde(default = "default_background")]
    pub text_color: String,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default)]
    pub horizontal_grid: bool,
    #[serde(default = "default_true")]
    pub vertical_grid: bool,
    #[serde(default = "default_crosshair")]
    pub crosshair: CrosshairMode,
    #[serde(default)]
    pub watermark: bool,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            background: default_background(),
            text_color: default_background(),
            font_size: default_font_size(),
            font_family: default_font_family(),
            horizontal_grid: false,
            vertical_grid: true,
            crosshair: default_crosshair(),
            watermark: false,
        }
    }
}

impl ChartOptions {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }
}

/// Colors of the price-area series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaStyle {
    pub line_color: String,
    pub top_color: String,
    pub bottom_color: String,
    pub line_width: u32,
}

impl Default for AreaStyle {
    fn default() -> Self {
        Self {
            line_color: "#4b40ee".to_string(),
            top_color: "rgba(75, 64, 238, 0.2)".to_string(),
            bottom_color: "rgba(75, 64, 238, 0)".to_string(),
            line_width: 2,
        }
    }
}

/// Volume histogram, drawn as an overlay in the lower part of the surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramStyle {
    pub color: String,
    /// Fraction of the height kept clear above the tallest bar.
    pub scale_margin_top: f64,
    pub scale_margin_bottom: f64,
}

impl Default for HistogramStyle {
    fn default() -> Self {
        Self {
            color: "#e7e9ec".to_string(),
            scale_margin_top: 0.7,
            scale_margin_bottom: 0.0,
        }
    }
}

/// Everything that, when changed, forces the surface to be rebuilt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(default)]
    pub options: ChartOptions,
    #[serde(default)]
    pub price_style: AreaStyle,
    #[serde(default)]
    pub volume_style: HistogramStyle,
}

/// A constructed chart with one price-area and one volume-histogram series.
pub trait ChartSurface: Send {
    /// Replace the full contents of the price series.
    fn set_price_data(&mut self, points: &[PricePoint]);
    /// Replace the full contents of the volume series.
    fn set_volume_data(&mut self, points: &[VolumePoint]);
    /// Update the trailing price point if `point.time` matches it, otherwise append.
    fn update_price(&mut self, point: PricePoint);
    fn resize(&mut self, dimensions: Dimensions);
    /// Fit the visible time range to the loaded data.
    fn fit_content(&mut self);
    /// Release the surface and its series.
    fn remove(&mut self);
}

/// Host element a surface is drawn into.
pub trait ChartContainer: Send {
    /// Current size, or `None` when the container is not mounted.
    fn measure(&self) -> Option<Dimensions>;
    fn create_surface(
        &mut self,
        config: &ChartConfig,
    ) -> Result<Box<dyn ChartSurface>, RenderSurfaceError>;
    /// Switch the container between its windowed and full-screen layout.
    fn set_full_screen(&mut self, full_screen: bool);
}
