use docforge_engine::errors::EngineError;
use docforge_export::PdfError;
use docforge_io::IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("编辑操作失败: {0}")]
    Engine(#[from] EngineError),
    #[error("文档读写失败: {0}")]
    Io(#[from] IoError),
    #[error("PDF 生成失败: {0}")]
    Pdf(#[from] PdfError),
    #[error("无法启动异步运行时: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("写入 {path:?} 失败: {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("当前没有已加载的文档")]
    DocumentNotLoaded,
}
