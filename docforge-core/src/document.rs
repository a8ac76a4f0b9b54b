use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::geometry::{Position, Size};

/// 自由格式的键值元数据（文档 metadata、控件 style、表格行等）。
pub type Metadata = Map<String, Value>;

/// 页面尺寸，默认 A4 @ 96 DPI。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
}

impl PageSize {
    pub const A4: PageSize = PageSize {
        width: 794.0,
        height: 1123.0,
        dpi: Some(96),
    };
}

impl Default for PageSize {
    fn default() -> Self {
        Self::A4
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub show_on_first_page: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FooterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub show_page_number: bool,
    /// 页码模板，例如 `"第 {page} 页"`；页码取自 `Page.number`。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number_format: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogoPosition {
    #[default]
    TopLeft,
    TopCenter,
    TopRight,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub position: LogoPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<f64>,
}

/// 文档级元信息，不含章节树。规范化后单独保存，可整体替换或逐字段修改。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub page_size: PageSize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<HeaderConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<FooterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<LogoConfig>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Metadata,
}

/// 嵌套形式的文档：Document → Section → Subsection → Page → Widget。
///
/// 导入导出与 PDF 生成都使用这一形态；编辑期间以规范化形式存储。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentModel {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub page_size: PageSize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<HeaderConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<FooterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<LogoConfig>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Metadata,
    #[serde(default)]
    pub sections: Vec<SectionModel>,
}

impl DocumentModel {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            version: "1.0".to_string(),
            ..Self::default()
        }
    }

    /// 由元信息与章节列表组装文档。
    pub fn from_parts(meta: DocumentMeta, sections: Vec<SectionModel>) -> Self {
        Self {
            id: meta.id,
            title: meta.title,
            version: meta.version,
            page_size: meta.page_size,
            header: meta.header,
            footer: meta.footer,
            logo: meta.logo,
            metadata: meta.metadata,
            sections,
        }
    }

    pub fn meta(&self) -> DocumentMeta {
        DocumentMeta {
            id: self.id.clone(),
            title: self.title.clone(),
            version: self.version.clone(),
            page_size: self.page_size,
            header: self.header.clone(),
            footer: self.footer.clone(),
            logo: self.logo.clone(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn pages(&self) -> impl Iterator<Item = &PageModel> + '_ {
        self.sections
            .iter()
            .flat_map(|section| section.subsections.iter())
            .flat_map(|subsection| subsection.pages.iter())
    }

    pub fn widgets(&self) -> impl Iterator<Item = &WidgetModel> + '_ {
        self.pages().flat_map(|page| page.widgets.iter())
    }

    pub fn find_widget(&self, widget_id: &str) -> Option<&WidgetModel> {
        self.widgets().find(|widget| widget.id == widget_id)
    }

    pub fn find_widget_mut(&mut self, widget_id: &str) -> Option<&mut WidgetModel> {
        self.sections
            .iter_mut()
            .flat_map(|section| section.subsections.iter_mut())
            .flat_map(|subsection| subsection.pages.iter_mut())
            .flat_map(|page| page.widgets.iter_mut())
            .find(|widget| widget.id == widget_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionModel {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subsections: Vec<SubsectionModel>,
}

impl SectionModel {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subsections: Vec::new(),
        }
    }

    pub fn with_subsection(mut self, subsection: SubsectionModel) -> Self {
        self.subsections.push(subsection);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsectionModel {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub pages: Vec<PageModel>,
}

impl SubsectionModel {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            pages: Vec::new(),
        }
    }

    pub fn with_page(mut self, page: PageModel) -> Self {
        self.pages.push(page);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageModel {
    pub id: String,
    /// 页眉页脚使用的页码，不由页面在数组中的位置推导。
    pub number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default)]
    pub widgets: Vec<WidgetModel>,
}

impl PageModel {
    pub fn new(id: impl Into<String>, number: u32) -> Self {
        Self {
            id: id.into(),
            number,
            ..Self::default()
        }
    }

    pub fn with_widget(mut self, widget: WidgetModel) -> Self {
        self.widgets.push(widget);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetModel {
    pub id: String,
    #[serde(flatten)]
    pub props: WidgetProps,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub size: Size,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Metadata>,
}

impl WidgetModel {
    pub fn new(id: impl Into<String>, props: WidgetProps) -> Self {
        Self {
            id: id.into(),
            props,
            position: Position::default(),
            size: Size::new(200.0, 120.0),
            rotation: 0.0,
            z_index: 0,
            locked: false,
            style: None,
        }
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.size = Size::new(width, height);
        self
    }

    #[inline]
    pub fn kind(&self) -> WidgetKind {
        self.props.kind()
    }

    #[inline]
    pub fn is_chart(&self) -> bool {
        matches!(self.props, WidgetProps::Chart(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetKind {
    Chart,
    Table,
    Text,
    Shape,
    Image,
}

impl WidgetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WidgetKind::Chart => "chart",
            WidgetKind::Table => "table",
            WidgetKind::Text => "text",
            WidgetKind::Shape => "shape",
            WidgetKind::Image => "image",
        }
    }
}

/// 按控件类型区分的属性。序列化为 `{"type": "...", "props": {...}}`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "props", rename_all = "lowercase")]
pub enum WidgetProps {
    Chart(ChartWidgetProps),
    Table(TableWidgetProps),
    Text(TextWidgetProps),
    Shape(ShapeWidgetProps),
    Image(ImageWidgetProps),
}

impl WidgetProps {
    pub fn kind(&self) -> WidgetKind {
        match self {
            WidgetProps::Chart(_) => WidgetKind::Chart,
            WidgetProps::Table(_) => WidgetKind::Table,
            WidgetProps::Text(_) => WidgetKind::Text,
            WidgetProps::Shape(_) => WidgetKind::Shape,
            WidgetProps::Image(_) => WidgetKind::Image,
        }
    }

    pub fn as_chart(&self) -> Option<&ChartWidgetProps> {
        match self {
            WidgetProps::Chart(chart) => Some(chart),
            _ => None,
        }
    }

    pub fn as_chart_mut(&mut self) -> Option<&mut ChartWidgetProps> {
        match self {
            WidgetProps::Chart(chart) => Some(chart),
            _ => None,
        }
    }

    /// 返回 `props` 部分的 JSON 对象形式。
    pub fn to_object(&self) -> Metadata {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut outer)) => match outer.remove("props") {
                Some(Value::Object(props)) => props,
                _ => Metadata::new(),
            },
            _ => Metadata::new(),
        }
    }

    /// 将 `patch` 的顶层键合并进属性（仅一层深度）。
    ///
    /// 合并结果不符合当前类型的结构时返回 `None`，类型本身不可通过合并改变。
    pub fn merged(&self, patch: &Metadata) -> Option<WidgetProps> {
        let mut props = self.to_object();
        for (key, value) in patch {
            props.insert(key.clone(), value.clone());
        }
        let mut outer = Metadata::new();
        outer.insert(
            "type".to_string(),
            Value::String(self.kind().as_str().to_string()),
        );
        outer.insert("props".to_string(), Value::Object(props));
        serde_json::from_value(Value::Object(outer)).ok()
    }
}

fn default_chart_provider() -> String {
    "echarts".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartWidgetProps {
    #[serde(default = "default_chart_provider")]
    pub provider: String,
    pub chart_type: ChartType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub data: ChartData,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
    /// 导出后写入的 data URL 图像。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_image: Option<String>,
}

impl ChartWidgetProps {
    pub fn new(chart_type: ChartType) -> Self {
        Self {
            provider: default_chart_provider(),
            chart_type,
            title: None,
            data: ChartData::default(),
            options: Metadata::new(),
            data_source: None,
            exported_image: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Area,
    Pie,
    Doughnut,
    Scatter,
    Radar,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub series: Vec<ChartSeries>,
}

impl ChartData {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.series.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub name: String,
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// 远程数据源描述。导出时只保留描述本身，不保留已拉取的数据。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub url: String,
    #[serde(default = "DataSource::default_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub headers: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
}

impl DataSource {
    fn default_method() -> String {
        "GET".to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableWidgetProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub columns: Vec<TableColumn>,
    #[serde(default)]
    pub rows: Vec<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumn {
    pub key: String,
    pub header: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextWidgetProps {
    /// 富文本内容（HTML 片段）。
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub align: TextAlign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
    Line,
    Triangle,
    Arrow,
}

fn default_stroke_width() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeWidgetProps {
    pub shape: ShapeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corner_radius: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFit {
    #[default]
    Contain,
    Cover,
    Fill,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageWidgetProps {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default)]
    pub fit: ImageFit,
}
