use std::env;
use std::path::{Path, PathBuf};

use docforge_config::AppConfig;
use docforge_engine::session::{DemoWidgets, EditorSession};
use docforge_io::{DocumentLoader, JsonFacade};
use tracing::{info, warn};

/// 文档来源，便于前端呈现加载信息。
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Json(PathBuf),
    Demo,
}

/// 统一封装加载后的编辑会话与元信息。
#[derive(Debug)]
pub struct LoadedSession {
    pub session: EditorSession,
    pub source: DocumentSource,
    pub demo_widgets: Option<DemoWidgets>,
}

/// 优先加载 `input`，其次是环境变量 `DOCFORGE_SAMPLE_JSON` 指定的文件，
/// 都失败时回退到内置示例。
pub fn load_session(input: Option<&Path>, config: &AppConfig) -> LoadedSession {
    let mut session =
        EditorSession::with_limits(config.history.max_entries, config.history.merge_window());

    let path = input
        .map(Path::to_path_buf)
        .or_else(|| env::var_os("DOCFORGE_SAMPLE_JSON").map(PathBuf::from));
    if let Some(path) = path {
        match JsonFacade::new().load(&path) {
            Ok(document) => {
                info!(path = %path.display(), document_id = %document.id, "从 JSON 加载文档成功");
                session.load_document(&document);
                return LoadedSession {
                    session,
                    source: DocumentSource::Json(path),
                    demo_widgets: None,
                };
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "加载 JSON 失败，回退到内置示例");
            }
        }
    }

    let demo_widgets = session.populate_demo();
    let _ = session.select(&demo_widgets.headline);

    LoadedSession {
        session,
        source: DocumentSource::Demo,
        demo_widgets: Some(demo_widgets),
    }
}
