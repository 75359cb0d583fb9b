pub mod binding;
pub mod headless;
pub mod surface;

pub use binding::ChartBinding;
pub use headless::{HeadlessContainer, SurfaceSnapshot};
pub use surface::{
    AreaStyle, ChartConfig, ChartContainer, ChartOptions, ChartSurface, CrosshairMode, Dimensions,
    HistogramStyle,
};
