use docforge_core::document::{
    DocumentModel, FooterConfig, HeaderConfig, LogoConfig, Metadata, PageModel, PageSize,
    SectionModel, SubsectionModel, WidgetModel,
};
use docforge_core::normalized::{
    NormalizedDocumentState, PagePatch, SectionPatch, SubsectionPatch, WidgetPatch, denormalize,
};
use tracing::debug;

/// 文档状态的全部变更意图。
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentIntent {
    SetDocument(DocumentModel),
    LoadDocument(DocumentModel),
    AddSection {
        section: SectionModel,
        index: Option<usize>,
    },
    AddSubsection {
        section_id: String,
        subsection: SubsectionModel,
        index: Option<usize>,
    },
    AddPage {
        subsection_id: String,
        page: PageModel,
        index: Option<usize>,
    },
    AddWidget {
        page_id: String,
        widget: WidgetModel,
        index: Option<usize>,
    },
    UpdateWidget {
        widget_id: String,
        changes: WidgetPatch,
    },
    UpdatePage {
        page_id: String,
        changes: PagePatch,
    },
    DeleteSection {
        section_id: String,
    },
    DeleteSubsection {
        subsection_id: String,
    },
    DeletePage {
        page_id: String,
    },
    DeleteWidget {
        page_id: String,
        widget_id: String,
    },
    RenameSection {
        section_id: String,
        title: String,
    },
    RenameSubsection {
        subsection_id: String,
        title: String,
    },
    RenamePage {
        page_id: String,
        title: String,
    },
    UpdatePageSize(PageSize),
    UpdateDocumentTitle(String),
    UpdateHeader(Option<HeaderConfig>),
    UpdateFooter(Option<FooterConfig>),
    UpdateLogo(Option<LogoConfig>),
    /// 顶层键合并进文档 metadata。
    UpdateMetadata(Metadata),
}

impl DocumentIntent {
    pub fn name(&self) -> &'static str {
        match self {
            DocumentIntent::SetDocument(_) => "set_document",
            DocumentIntent::LoadDocument(_) => "load_document",
            DocumentIntent::AddSection { .. } => "add_section",
            DocumentIntent::AddSubsection { .. } => "add_subsection",
            DocumentIntent::AddPage { .. } => "add_page",
            DocumentIntent::AddWidget { .. } => "add_widget",
            DocumentIntent::UpdateWidget { .. } => "update_widget",
            DocumentIntent::UpdatePage { .. } => "update_page",
            DocumentIntent::DeleteSection { .. } => "delete_section",
            DocumentIntent::DeleteSubsection { .. } => "delete_subsection",
            DocumentIntent::DeletePage { .. } => "delete_page",
            DocumentIntent::DeleteWidget { .. } => "delete_widget",
            DocumentIntent::RenameSection { .. } => "rename_section",
            DocumentIntent::RenameSubsection { .. } => "rename_subsection",
            DocumentIntent::RenamePage { .. } => "rename_page",
            DocumentIntent::UpdatePageSize(_) => "update_page_size",
            DocumentIntent::UpdateDocumentTitle(_) => "update_document_title",
            DocumentIntent::UpdateHeader(_) => "update_header",
            DocumentIntent::UpdateFooter(_) => "update_footer",
            DocumentIntent::UpdateLogo(_) => "update_logo",
            DocumentIntent::UpdateMetadata(_) => "update_metadata",
        }
    }
}

/// 纯状态转换：消费旧状态与意图，返回新状态。
///
/// 对未知 ID 的意图不会报错，原样返回输入状态。
pub fn apply(mut state: NormalizedDocumentState, intent: DocumentIntent) -> NormalizedDocumentState {
    let name = intent.name();
    let applied = match intent {
        DocumentIntent::SetDocument(document) | DocumentIntent::LoadDocument(document) => {
            return NormalizedDocumentState::from_document(&document);
        }
        DocumentIntent::AddSection { section, index } => state.insert_section(&section, index),
        DocumentIntent::AddSubsection {
            section_id,
            subsection,
            index,
        } => state.insert_subsection(&section_id, &subsection, index),
        DocumentIntent::AddPage {
            subsection_id,
            page,
            index,
        } => state.insert_page(&subsection_id, &page, index),
        DocumentIntent::AddWidget {
            page_id,
            widget,
            index,
        } => state.insert_widget(&page_id, &widget, index),
        DocumentIntent::UpdateWidget { widget_id, changes } => {
            state.update_widget(&widget_id, &changes)
        }
        DocumentIntent::UpdatePage { page_id, changes } => state.update_page(&page_id, &changes),
        DocumentIntent::DeleteSection { section_id } => state.remove_section(&section_id),
        DocumentIntent::DeleteSubsection { subsection_id } => {
            state.remove_subsection(&subsection_id)
        }
        DocumentIntent::DeletePage { page_id } => state.remove_page(&page_id),
        DocumentIntent::DeleteWidget { page_id, widget_id } => {
            state.remove_widget(&page_id, &widget_id)
        }
        DocumentIntent::RenameSection { section_id, title } => state.update_section(
            &section_id,
            &SectionPatch { title: Some(title) },
        ),
        DocumentIntent::RenameSubsection {
            subsection_id,
            title,
        } => state.update_subsection(&subsection_id, &SubsectionPatch { title: Some(title) }),
        DocumentIntent::RenamePage { page_id, title } => state.update_page(
            &page_id,
            &PagePatch {
                title: Some(Some(title)),
                ..PagePatch::default()
            },
        ),
        DocumentIntent::UpdatePageSize(size) => state.update_meta(|meta| meta.page_size = size),
        DocumentIntent::UpdateDocumentTitle(title) => state.update_meta(|meta| meta.title = title),
        DocumentIntent::UpdateHeader(header) => state.update_meta(|meta| meta.header = header),
        DocumentIntent::UpdateFooter(footer) => state.update_meta(|meta| meta.footer = footer),
        DocumentIntent::UpdateLogo(logo) => state.update_meta(|meta| meta.logo = logo),
        DocumentIntent::UpdateMetadata(entries) => {
            state.update_meta(|meta| meta.metadata.extend(entries))
        }
    };
    if !applied {
        debug!(intent = name, "意图未生效（引用了未知 ID 或发生 ID 冲突），状态保持不变");
    }
    state
}

/// 持有规范化文档状态，逐个应用意图。
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    state: NormalizedDocumentState,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: &DocumentModel) -> Self {
        Self {
            state: NormalizedDocumentState::from_document(document),
        }
    }

    #[inline]
    pub fn state(&self) -> &NormalizedDocumentState {
        &self.state
    }

    pub fn dispatch(&mut self, intent: DocumentIntent) {
        let state = std::mem::take(&mut self.state);
        self.state = apply(state, intent);
    }

    /// 用快照整体替换状态，供快照式撤销使用。
    pub fn replace_state(&mut self, state: NormalizedDocumentState) {
        self.state = state;
    }

    /// 按需重建嵌套文档。
    pub fn document(&self) -> Option<DocumentModel> {
        denormalize(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use docforge_core::document::{ChartType, ChartWidgetProps, TextWidgetProps, WidgetProps};
    use docforge_core::geometry::Position;
    use serde_json::json;

    use super::*;

    fn document() -> DocumentModel {
        let mut document = DocumentModel::new("doc", "Report");
        document.sections.push(
            SectionModel::new("s1", "One").with_subsection(
                SubsectionModel::new("ss1", "One.A")
                    .with_page(
                        PageModel::new("p1", 1).with_widget(WidgetModel::new(
                            "w1",
                            WidgetProps::Chart(ChartWidgetProps::new(ChartType::Pie)),
                        )),
                    )
                    .with_page(PageModel::new("p2", 2)),
            ),
        );
        document
    }

    fn text_widget(id: &str) -> WidgetModel {
        WidgetModel::new(id, WidgetProps::Text(TextWidgetProps::default()))
    }

    #[test]
    fn set_document_replaces_state_wholesale() {
        let store = DocumentStore::with_document(&document());
        let mut other = DocumentModel::new("doc-2", "Other");
        other.sections.push(SectionModel::new("x", "X"));

        let state = apply(store.state().clone(), DocumentIntent::SetDocument(other.clone()));
        assert!(state.section("s1").is_none());
        assert!(state.widget("w1").is_none());
        assert_eq!(denormalize(&state), Some(other));
    }

    #[test]
    fn add_widget_appends_to_page_order() {
        let mut store = DocumentStore::with_document(&document());
        store.dispatch(DocumentIntent::AddWidget {
            page_id: "p1".to_string(),
            widget: text_widget("w2"),
            index: None,
        });
        store.dispatch(DocumentIntent::AddWidget {
            page_id: "p1".to_string(),
            widget: text_widget("w0"),
            index: Some(0),
        });
        assert_eq!(store.state().widget_ids("p1"), &["w0", "w1", "w2"]);
        assert_eq!(store.state().widget("w2").unwrap().page_id, "p1");
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let store = DocumentStore::with_document(&document());
        let original = store.state().clone();

        let intents = vec![
            DocumentIntent::AddWidget {
                page_id: "ghost".to_string(),
                widget: text_widget("w9"),
                index: None,
            },
            DocumentIntent::UpdateWidget {
                widget_id: "ghost".to_string(),
                changes: WidgetPatch::position(Position::new(1.0, 1.0)),
            },
            DocumentIntent::DeleteWidget {
                page_id: "ghost".to_string(),
                widget_id: "w1".to_string(),
            },
            DocumentIntent::DeleteSection {
                section_id: "ghost".to_string(),
            },
            DocumentIntent::DeleteSubsection {
                subsection_id: "ghost".to_string(),
            },
            DocumentIntent::DeletePage {
                page_id: "ghost".to_string(),
            },
            DocumentIntent::RenameSection {
                section_id: "ghost".to_string(),
                title: "t".to_string(),
            },
            DocumentIntent::RenamePage {
                page_id: "ghost".to_string(),
                title: "t".to_string(),
            },
            DocumentIntent::AddPage {
                subsection_id: "ghost".to_string(),
                page: PageModel::new("p9", 9),
                index: None,
            },
        ];
        for intent in intents {
            let next = apply(original.clone(), intent);
            assert_eq!(next, original);
        }
    }

    #[test]
    fn meta_updates_require_loaded_document() {
        let empty = apply(
            NormalizedDocumentState::new(),
            DocumentIntent::UpdateDocumentTitle("x".to_string()),
        );
        assert!(empty.meta().is_none());

        let mut store = DocumentStore::with_document(&document());
        store.dispatch(DocumentIntent::UpdateDocumentTitle("Renamed".to_string()));
        store.dispatch(DocumentIntent::UpdatePageSize(PageSize {
            width: 1123.0,
            height: 794.0,
            dpi: None,
        }));
        store.dispatch(DocumentIntent::UpdateMetadata(
            [("team".to_string(), json!("bi"))].into_iter().collect(),
        ));
        let meta = store.state().meta().unwrap();
        assert_eq!(meta.title, "Renamed");
        assert_eq!(meta.page_size.width, 1123.0);
        assert_eq!(meta.metadata["team"], json!("bi"));
    }

    #[test]
    fn rename_and_delete_page() {
        let mut store = DocumentStore::with_document(&document());
        store.dispatch(DocumentIntent::RenamePage {
            page_id: "p2".to_string(),
            title: "Appendix".to_string(),
        });
        assert_eq!(
            store.state().page("p2").unwrap().title.as_deref(),
            Some("Appendix")
        );
        store.dispatch(DocumentIntent::DeletePage {
            page_id: "p1".to_string(),
        });
        assert!(store.state().widget("w1").is_none());
        assert_eq!(store.state().page_ids("ss1"), &["p2"]);
        assert!(store.state().integrity_violations().is_empty());
    }
}
