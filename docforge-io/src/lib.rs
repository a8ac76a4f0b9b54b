use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use docforge_core::document::{ChartData, DocumentModel, WidgetProps};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

/// 导出文件的格式版本。
pub const FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<DocumentModel, IoError>;
}

pub trait DocumentSaver {
    fn save(&self, document: &DocumentModel, path: &Path) -> Result<(), IoError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub exported_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_by: Option<String>,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// 导出文件的外层结构：元信息加完整的嵌套文档。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEnvelope {
    pub metadata: ExportMetadata,
    pub document: DocumentModel,
}

/// JSON 格式的导入导出。
#[derive(Debug, Clone, Default)]
pub struct JsonFacade {
    exported_by: Option<String>,
    app_version: Option<String>,
    description: Option<String>,
}

impl JsonFacade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exported_by(mut self, author: impl Into<String>) -> Self {
        self.exported_by = Some(author.into());
        self
    }

    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 生成导出信封。文档会先经过 [`sanitize_for_export`]。
    pub fn envelope(&self, document: &DocumentModel) -> ExportEnvelope {
        ExportEnvelope {
            metadata: ExportMetadata {
                exported_at: Utc::now(),
                exported_by: self.exported_by.clone(),
                version: FORMAT_VERSION.to_string(),
                app_version: self.app_version.clone(),
                description: self.description.clone(),
            },
            document: sanitize_for_export(document),
        }
    }

    pub fn to_json(&self, document: &DocumentModel) -> Result<String, IoError> {
        Ok(serde_json::to_string_pretty(&self.envelope(document))?)
    }

    /// 解析导出信封；也接受不带信封的裸文档。
    pub fn parse(&self, text: &str) -> Result<(Option<ExportMetadata>, DocumentModel), IoError> {
        let value: Value = serde_json::from_str(text)?;
        let is_envelope = value
            .as_object()
            .is_some_and(|object| object.contains_key("document") && object.contains_key("metadata"));

        let (metadata, document) = if is_envelope {
            let envelope: ExportEnvelope = serde_json::from_value(value)?;
            check_version(&envelope.metadata.version)?;
            (Some(envelope.metadata), envelope.document)
        } else {
            (None, serde_json::from_value::<DocumentModel>(value)?)
        };
        validate(&document)?;
        Ok((metadata, document))
    }
}

impl DocumentLoader for JsonFacade {
    fn load(&self, path: &Path) -> Result<DocumentModel, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let (metadata, document) = self.parse(&data)?;
        debug!(
            path = %path.display(),
            document_id = %document.id,
            exported_at = ?metadata.as_ref().map(|m| m.exported_at),
            "已读取文档"
        );
        Ok(document)
    }
}

impl DocumentSaver for JsonFacade {
    fn save(&self, document: &DocumentModel, path: &Path) -> Result<(), IoError> {
        let json = self.to_json(document)?;
        fs::write(path, json).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), document_id = %document.id, "文档已导出");
        Ok(())
    }
}

/// 去掉由远程数据源拉取的内容，只保留数据源描述。
///
/// 表格清空行；图表换成同类型的空数据集。
pub fn sanitize_for_export(document: &DocumentModel) -> DocumentModel {
    let mut sanitized = document.clone();
    for section in &mut sanitized.sections {
        for subsection in &mut section.subsections {
            for page in &mut subsection.pages {
                for widget in &mut page.widgets {
                    match &mut widget.props {
                        WidgetProps::Table(table) if table.data_source.is_some() => {
                            table.rows.clear();
                        }
                        WidgetProps::Chart(chart) if chart.data_source.is_some() => {
                            chart.data = ChartData::default();
                        }
                        _ => {}
                    }
                }
            }
        }
    }
    sanitized
}

fn check_version(version: &str) -> Result<(), IoError> {
    let major = version.split('.').next().unwrap_or_default();
    if major == "1" {
        Ok(())
    } else {
        Err(IoError::UnsupportedFeature(format!(
            "document format version {version}"
        )))
    }
}

/// 同类实体的 ID 必须唯一，否则规范化后无法还原。
fn validate(document: &DocumentModel) -> Result<(), IoError> {
    if document.id.is_empty() {
        return Err(IoError::InvalidDocument("document id is empty".to_string()));
    }
    let mut sections = HashSet::new();
    let mut subsections = HashSet::new();
    let mut pages = HashSet::new();
    let mut widgets = HashSet::new();
    for section in &document.sections {
        ensure_unique(&mut sections, "section", &section.id)?;
        for subsection in &section.subsections {
            ensure_unique(&mut subsections, "subsection", &subsection.id)?;
            for page in &subsection.pages {
                ensure_unique(&mut pages, "page", &page.id)?;
                for widget in &page.widgets {
                    ensure_unique(&mut widgets, "widget", &widget.id)?;
                }
            }
        }
    }
    Ok(())
}

fn ensure_unique<'a>(
    seen: &mut HashSet<&'a str>,
    kind: &str,
    id: &'a str,
) -> Result<(), IoError> {
    if seen.insert(id) {
        Ok(())
    } else {
        Err(IoError::InvalidDocument(format!("duplicate {kind} id {id}")))
    }
}
