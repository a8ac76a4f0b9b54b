use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("chart {0} is not mounted")]
    NotMounted(String),
    #[error("chart {0} produced no drawable output")]
    EmptySurface(String),
    #[error("failed to capture chart {widget_id}: {reason}")]
    Failed { widget_id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum RasterizeError {
    #[error("failed to parse SVG: {0}")]
    Parse(String),
    #[error("cannot allocate a {width}x{height} pixel buffer")]
    Buffer { width: u32, height: u32 },
    #[error("failed to encode PNG")]
    Encode,
}

/// 图表绘制结果：画布直接给出 data URL，SVG 需要再栅格化。
#[derive(Debug, Clone, PartialEq)]
pub enum ChartSurface {
    Canvas { data_url: String },
    Svg { markup: String, width: u32, height: u32 },
}

/// 读取已挂载图表的绘制结果。
#[async_trait]
pub trait ChartCapturer: Send + Sync {
    async fn capture(&self, widget_id: &str) -> Result<ChartSurface, CaptureError>;
}

pub trait SvgRasterizer: Send + Sync {
    /// 把 SVG 绘制到 `width`×`height` 的画布并编码为 PNG。
    fn rasterize(&self, svg: &str, width: u32, height: u32) -> Result<Vec<u8>, RasterizeError>;
}

/// 把绘制结果转为可内联的图片 data URL。
///
/// 栅格化不可用或失败时退化为 base64 编码的 SVG。
pub fn to_data_url(surface: ChartSurface, rasterizer: Option<&dyn SvgRasterizer>) -> String {
    match surface {
        ChartSurface::Canvas { data_url } => data_url,
        ChartSurface::Svg {
            markup,
            width,
            height,
        } => match rasterizer.map(|r| r.rasterize(&markup, width, height)) {
            Some(Ok(png)) => format!("data:image/png;base64,{}", STANDARD.encode(png)),
            Some(Err(err)) => {
                warn!(error = %err, "SVG 栅格化失败，改用 SVG 图像");
                svg_data_url(&markup)
            }
            None => svg_data_url(&markup),
        },
    }
}

pub fn svg_data_url(markup: &str) -> String {
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(markup.as_bytes()))
}

#[cfg(feature = "raster")]
pub use resvg_backend::ResvgRasterizer;

#[cfg(feature = "raster")]
mod resvg_backend {
    use resvg::tiny_skia::{Pixmap, Transform};
    use resvg::usvg::{Options, Tree};

    use super::{RasterizeError, SvgRasterizer};

    /// 基于 resvg 的软件栅格化。
    #[derive(Debug, Default, Clone, Copy)]
    pub struct ResvgRasterizer;

    impl SvgRasterizer for ResvgRasterizer {
        fn rasterize(&self, svg: &str, width: u32, height: u32) -> Result<Vec<u8>, RasterizeError> {
            let tree = Tree::from_data(svg.as_bytes(), &Options::default())
                .map_err(|e| RasterizeError::Parse(e.to_string()))?;

            let mut pixmap =
                Pixmap::new(width, height).ok_or(RasterizeError::Buffer { width, height })?;
            let size = tree.size();
            let transform = Transform::from_scale(
                width as f32 / size.width(),
                height as f32 / size.height(),
            );
            resvg::render(&tree, transform, &mut pixmap.as_mut());

            pixmap.encode_png().map_err(|_| RasterizeError::Encode)
        }
    }
}
