use std::collections::HashMap;
use std::sync::Arc;

use docforge_core::document::{ChartData, ChartType, ChartWidgetProps, Metadata, TableWidgetProps};
use docforge_core::geometry::Size;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("render container {0} has no drawable area")]
    EmptyContainer(String),
    #[error("chart type {0:?} is not supported by adapter {1}")]
    UnsupportedChart(ChartType, String),
    #[error("adapter failed to render: {0}")]
    Render(String),
}

/// 渲染目标。具体的 DOM/画布由宿主提供，这里只描述标识与尺寸。
#[derive(Debug, Clone, PartialEq)]
pub struct RenderContainer {
    pub element_id: String,
    pub size: Size,
}

impl RenderContainer {
    pub fn new(element_id: impl Into<String>, size: Size) -> Self {
        Self {
            element_id: element_id.into(),
            size,
        }
    }
}

/// 以字符串 ID 注册的渲染提供方。
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;
}

pub trait ChartInstance: Send {
    fn destroy(&mut self) {}

    /// 原地刷新数据；不支持时返回 `false`，调用方应重新渲染。
    fn update_data(&mut self, _data: &ChartData) -> bool {
        false
    }

    /// 以 SVG 绘制的实例可以直接提供标记文本用于导出截图。
    fn svg(&self) -> Option<String> {
        None
    }
}

pub trait ChartAdapter: Provider {
    fn render(
        &self,
        container: &RenderContainer,
        props: &ChartWidgetProps,
    ) -> Result<Box<dyn ChartInstance>, AdapterError>;
}

pub trait TableInstance: Send {
    fn destroy(&mut self) {}

    fn update_rows(&mut self, _rows: &[Metadata]) -> bool {
        false
    }

    fn html(&self) -> Option<String> {
        None
    }
}

pub trait TableAdapter: Provider {
    fn render(
        &self,
        container: &RenderContainer,
        props: &TableWidgetProps,
    ) -> Result<Box<dyn TableInstance>, AdapterError>;
}

/// 提供方 ID 到适配器的映射。查找未知 ID 时回退到默认提供方。
pub struct AdapterRegistry<A: ?Sized> {
    adapters: HashMap<String, Arc<A>>,
    default_id: String,
}

pub type ChartAdapterRegistry = AdapterRegistry<dyn ChartAdapter>;
pub type TableAdapterRegistry = AdapterRegistry<dyn TableAdapter>;

impl<A: Provider + ?Sized> AdapterRegistry<A> {
    pub fn new(default_id: impl Into<String>) -> Self {
        Self {
            adapters: HashMap::new(),
            default_id: default_id.into(),
        }
    }

    /// 注册适配器，返回被替换的同 ID 适配器。
    pub fn register(&mut self, adapter: Arc<A>) -> Option<Arc<A>> {
        self.adapters.insert(adapter.id().to_string(), adapter)
    }

    pub fn unregister(&mut self, id: &str) -> Option<Arc<A>> {
        self.adapters.remove(id)
    }

    pub fn get_adapter(&self, id: &str) -> Option<Arc<A>> {
        self.adapters
            .get(id)
            .or_else(|| self.adapters.get(&self.default_id))
            .cloned()
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.adapters.contains_key(id)
    }

    #[inline]
    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn list_adapters(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl ChartAdapterRegistry {
    /// 内置 SVG 适配器作为默认提供方。
    pub fn with_builtin() -> Self {
        let mut registry = Self::new(SvgChartAdapter::ID);
        registry.register(Arc::new(SvgChartAdapter));
        registry
    }
}

impl TableAdapterRegistry {
    pub fn with_builtin() -> Self {
        let mut registry = Self::new(HtmlTableAdapter::ID);
        registry.register(Arc::new(HtmlTableAdapter));
        registry
    }
}

/// 无依赖的 SVG 图表适配器，供无界面导出与预览使用。
#[derive(Debug, Default, Clone, Copy)]
pub struct SvgChartAdapter;

impl SvgChartAdapter {
    pub const ID: &'static str = "svg";
}

impl Provider for SvgChartAdapter {
    fn id(&self) -> &str {
        Self::ID
    }
}

impl ChartAdapter for SvgChartAdapter {
    fn render(
        &self,
        container: &RenderContainer,
        props: &ChartWidgetProps,
    ) -> Result<Box<dyn ChartInstance>, AdapterError> {
        if container.size.is_empty() {
            return Err(AdapterError::EmptyContainer(container.element_id.clone()));
        }
        if props.chart_type == ChartType::Radar {
            return Err(AdapterError::UnsupportedChart(
                props.chart_type,
                Self::ID.to_string(),
            ));
        }
        Ok(Box::new(SvgChartInstance {
            size: container.size,
            chart_type: props.chart_type,
            title: props.title.clone(),
            markup: render_svg(container.size, props.chart_type, props.title.as_deref(), &props.data),
        }))
    }
}

struct SvgChartInstance {
    size: Size,
    chart_type: ChartType,
    title: Option<String>,
    markup: String,
}

impl ChartInstance for SvgChartInstance {
    fn destroy(&mut self) {
        self.markup.clear();
    }

    fn update_data(&mut self, data: &ChartData) -> bool {
        self.markup = render_svg(self.size, self.chart_type, self.title.as_deref(), data);
        true
    }

    fn svg(&self) -> Option<String> {
        if self.markup.is_empty() {
            None
        } else {
            Some(self.markup.clone())
        }
    }
}

const PALETTE: [&str; 5] = ["#5470c6", "#91cc75", "#fac858", "#ee6666", "#73c0de"];

fn render_svg(size: Size, chart_type: ChartType, title: Option<&str>, data: &ChartData) -> String {
    let (width, height) = (size.width, size.height);
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );
    svg.push_str(r##"<rect width="100%" height="100%" fill="#ffffff"/>"##);
    if let Some(title) = title {
        svg.push_str(&format!(
            r#"<text x="{}" y="16" text-anchor="middle" font-size="12">{}</text>"#,
            width / 2.0,
            escape_xml(title)
        ));
    }

    let max = data
        .series
        .iter()
        .flat_map(|series| series.values.iter().copied())
        .fold(0.0_f64, f64::max);
    let slots = data
        .series
        .iter()
        .map(|series| series.values.len())
        .max()
        .unwrap_or(0);

    if max > 0.0 && slots > 0 {
        let plot_top = 24.0;
        let plot_height = (height - plot_top - 4.0).max(1.0);
        let slot_width = width / slots as f64;
        for (index, series) in data.series.iter().enumerate() {
            let color = series
                .color
                .clone()
                .unwrap_or_else(|| PALETTE[index % PALETTE.len()].to_string());
            match chart_type {
                ChartType::Line | ChartType::Area | ChartType::Scatter => {
                    let points: Vec<String> = series
                        .values
                        .iter()
                        .enumerate()
                        .map(|(i, value)| {
                            let x = slot_width * (i as f64 + 0.5);
                            let y = plot_top + plot_height * (1.0 - value / max);
                            format!("{x:.1},{y:.1}")
                        })
                        .collect();
                    svg.push_str(&format!(
                        r#"<polyline points="{}" fill="none" stroke="{color}" stroke-width="2"/>"#,
                        points.join(" ")
                    ));
                }
                _ => {
                    let bar_width = slot_width / (data.series.len() as f64 + 1.0);
                    for (i, value) in series.values.iter().enumerate() {
                        let bar_height = plot_height * (value / max);
                        let x = slot_width * i as f64 + bar_width * (index as f64 + 0.5);
                        let y = plot_top + plot_height - bar_height;
                        svg.push_str(&format!(
                            r#"<rect x="{x:.1}" y="{y:.1}" width="{bar_width:.1}" height="{bar_height:.1}" fill="{color}"/>"#
                        ));
                    }
                }
            }
        }
    }

    svg.push_str("</svg>");
    svg
}

/// 无依赖的 HTML 表格适配器。
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlTableAdapter;

impl HtmlTableAdapter {
    pub const ID: &'static str = "html";
}

impl Provider for HtmlTableAdapter {
    fn id(&self) -> &str {
        Self::ID
    }
}

impl TableAdapter for HtmlTableAdapter {
    fn render(
        &self,
        container: &RenderContainer,
        props: &TableWidgetProps,
    ) -> Result<Box<dyn TableInstance>, AdapterError> {
        if container.size.is_empty() {
            return Err(AdapterError::EmptyContainer(container.element_id.clone()));
        }
        let mut instance = HtmlTableInstance {
            columns: props
                .columns
                .iter()
                .map(|c| (c.key.clone(), c.header.clone()))
                .collect(),
            markup: String::new(),
        };
        instance.update_rows(&props.rows);
        Ok(Box::new(instance))
    }
}

struct HtmlTableInstance {
    columns: Vec<(String, String)>,
    markup: String,
}

impl TableInstance for HtmlTableInstance {
    fn destroy(&mut self) {
        self.markup.clear();
    }

    fn update_rows(&mut self, rows: &[Metadata]) -> bool {
        let mut html = String::from("<table><thead><tr>");
        for (_, header) in &self.columns {
            html.push_str(&format!("<th>{}</th>", escape_xml(header)));
        }
        html.push_str("</tr></thead><tbody>");
        for row in rows {
            html.push_str("<tr>");
            for (key, _) in &self.columns {
                let cell = match row.get(key) {
                    Some(serde_json::Value::String(text)) => text.clone(),
                    Some(serde_json::Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                html.push_str(&format!("<td>{}</td>", escape_xml(&cell)));
            }
            html.push_str("</tr>");
        }
        html.push_str("</tbody></table>");
        self.markup = html;
        true
    }

    fn html(&self) -> Option<String> {
        Some(self.markup.clone())
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
