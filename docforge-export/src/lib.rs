pub mod cache;
pub mod capture;
pub mod coordinator;
pub mod pdf;
pub mod registry;

pub use capture::{CaptureError, ChartCapturer, ChartSurface, RasterizeError, SvgRasterizer};
pub use coordinator::{
    ChartExportCoordinator, ChartExportOutcome, EditorNavigator, ExportReport, ExportSettings,
};
pub use pdf::{PdfClient, PdfError};
pub use registry::{ChartRenderRegistry, ChartRenderState, RegistryEvent, RenderStatus};
