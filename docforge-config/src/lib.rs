use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub pdf: PdfConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `DOCFORGE_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("DOCFORGE_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 撤销历史：栈容量与属性修改的合并窗口。
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "HistoryConfig::default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "HistoryConfig::default_merge_window_ms")]
    pub merge_window_ms: u64,
}

impl HistoryConfig {
    fn default_max_entries() -> usize {
        50
    }

    fn default_merge_window_ms() -> u64 {
        800
    }

    #[inline]
    pub fn merge_window(&self) -> Duration {
        Duration::from_millis(self.merge_window_ms)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: Self::default_max_entries(),
            merge_window_ms: Self::default_merge_window_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "ExportConfig::default_timeout_ms")]
    pub registration_timeout_ms: u64,
    #[serde(default = "ExportConfig::default_timeout_ms")]
    pub render_timeout_ms: u64,
    #[serde(default = "ExportConfig::default_capture_concurrency")]
    pub capture_concurrency: usize,
    #[serde(default = "ExportConfig::default_cache_capacity")]
    pub cache_capacity: usize,
}

impl ExportConfig {
    fn default_timeout_ms() -> u64 {
        15_000
    }

    fn default_capture_concurrency() -> usize {
        2
    }

    fn default_cache_capacity() -> usize {
        100
    }

    #[inline]
    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }

    #[inline]
    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            registration_timeout_ms: Self::default_timeout_ms(),
            render_timeout_ms: Self::default_timeout_ms(),
            capture_concurrency: Self::default_capture_concurrency(),
            cache_capacity: Self::default_cache_capacity(),
        }
    }
}

/// PDF 生成服务。`endpoint` 为空时不生成 PDF。
#[derive(Debug, Clone, Deserialize)]
pub struct PdfConfig {
    #[serde(default = "PdfConfig::default_endpoint")]
    pub endpoint: String,
    #[serde(default = "PdfConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl PdfConfig {
    fn default_endpoint() -> String {
        "http://localhost:3000/api/pdf".to_string()
    }

    fn default_timeout_ms() -> u64 {
        60_000
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_cover_every_section() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.history.max_entries, 50);
        assert_eq!(cfg.history.merge_window(), Duration::from_millis(800));
        assert_eq!(cfg.export.registration_timeout(), Duration::from_secs(15));
        assert_eq!(cfg.export.render_timeout(), Duration::from_secs(15));
        assert_eq!(cfg.export.capture_concurrency, 2);
        assert_eq!(cfg.export.cache_capacity, 100);
        assert_eq!(cfg.pdf.endpoint, "http://localhost:3000/api/pdf");
        assert_eq!(cfg.pdf.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [history]
            merge_window_ms = 250

            [export]
            registration_timeout_ms = 3000
            capture_concurrency = 4

            [pdf]
            endpoint = ""
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.history.max_entries, 50);
        assert_eq!(cfg.history.merge_window(), Duration::from_millis(250));
        assert_eq!(cfg.export.registration_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.export.render_timeout(), Duration::from_secs(15));
        assert_eq!(cfg.export.capture_concurrency, 4);
        assert!(cfg.pdf.endpoint.is_empty());
        assert_eq!(cfg.pdf.timeout_ms, 60_000);
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[history\nmax_entries = ").unwrap();

        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let err = AppConfig::from_file(file.path().with_extension("missing")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
