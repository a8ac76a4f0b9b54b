pub mod adapter;
pub mod command;
pub mod history;
pub mod store;

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("document is not loaded")]
        DocumentNotLoaded,
        #[error("page {0} not found")]
        PageNotFound(String),
        #[error("subsection {0} not found")]
        SubsectionNotFound(String),
        #[error("widget {0} not found")]
        WidgetNotFound(String),
        #[error("widget id {0} is already in use")]
        DuplicateWidget(String),
        #[error("page {page_id} does not belong to subsection {subsection_id}")]
        PageOutsideSubsection {
            subsection_id: String,
            page_id: String,
        },
        #[error("clipboard is empty")]
        ClipboardEmpty,
    }
}

pub mod session {
    use std::collections::HashSet;
    use std::time::{Duration, Instant};

    use docforge_core::document::{
        ChartData, ChartSeries, ChartType, ChartWidgetProps, DocumentModel, PageModel,
        SectionModel, SubsectionModel, TextWidgetProps, WidgetModel, WidgetProps,
    };
    use docforge_core::geometry::Rect;
    use docforge_core::navigation::NavigationCursor;
    use docforge_core::normalized::{Widget, WidgetPatch};
    use tracing::debug;
    use uuid::Uuid;

    use crate::command::{
        AddWidgetCommand, Command, DEFAULT_MERGE_WINDOW, DeleteWidgetCommand, UpdateWidgetCommand,
    };
    use crate::errors::EngineError;
    use crate::history::{CommandHistory, DEFAULT_MAX_ENTRIES};
    use crate::store::{DocumentIntent, DocumentStore};

    const DEFAULT_ZOOM: f64 = 1.0;
    const MIN_ZOOM: f64 = 0.1;
    const MAX_ZOOM: f64 = 5.0;
    /// 粘贴时相对原控件的偏移。
    const PASTE_OFFSET: f64 = 10.0;

    /// 画布视口状态。缩放级别单独记入缩放历史。
    #[derive(Debug, Clone, Copy)]
    pub struct ViewportState {
        pub zoom: f64,
    }

    impl ViewportState {
        #[inline]
        fn clamp_zoom(value: f64) -> f64 {
            value.clamp(MIN_ZOOM, MAX_ZOOM)
        }
    }

    impl Default for ViewportState {
        fn default() -> Self {
            Self { zoom: DEFAULT_ZOOM }
        }
    }

    /// 编辑会话：文档状态、撤销历史以及选中集、视口、导航游标、剪贴板等运行时状态。
    #[derive(Debug)]
    pub struct EditorSession {
        store: DocumentStore,
        history: CommandHistory,
        selected: HashSet<String>,
        viewport: ViewportState,
        cursor: NavigationCursor,
        clipboard: Vec<WidgetModel>,
        merge_window: Duration,
    }

    #[derive(Debug, Clone)]
    pub struct DemoWidgets {
        pub headline: String,
        pub revenue_chart: String,
        pub trend_chart: String,
    }

    impl EditorSession {
        pub fn new() -> Self {
            Self::with_limits(DEFAULT_MAX_ENTRIES, DEFAULT_MERGE_WINDOW)
        }

        /// 指定撤销栈上限与属性修改合并窗口。
        pub fn with_limits(max_entries: usize, merge_window: Duration) -> Self {
            Self {
                store: DocumentStore::new(),
                history: CommandHistory::new(max_entries),
                selected: HashSet::new(),
                viewport: ViewportState::default(),
                cursor: NavigationCursor::default(),
                clipboard: Vec::new(),
                merge_window,
            }
        }

        /// 替换当前文档并重置运行时状态，游标指向第一个页面。
        pub fn load_document(&mut self, document: &DocumentModel) {
            self.store.dispatch(DocumentIntent::LoadDocument(document.clone()));
            self.history.clear();
            self.selected.clear();
            self.viewport = ViewportState::default();
            self.cursor = first_page_cursor(document);
            debug!(
                document_id = %document.id,
                widgets = self.store.state().widgets().len(),
                "已加载文档"
            );
        }

        #[inline]
        pub fn store(&self) -> &DocumentStore {
            &self.store
        }

        #[inline]
        pub fn history(&self) -> &CommandHistory {
            &self.history
        }

        /// 按需重建嵌套文档；尚未加载文档时返回 `None`。
        pub fn document(&self) -> Option<DocumentModel> {
            self.store.document()
        }

        pub fn execute(&mut self, command: Box<dyn Command>) {
            self.history
                .execute_document_command(&mut self.store, command);
        }

        pub fn undo(&mut self) -> bool {
            let undone = self.history.undo_document(&mut self.store);
            if undone {
                self.prune_selection();
            }
            undone
        }

        pub fn redo(&mut self) -> bool {
            let redone = self.history.redo_document(&mut self.store);
            if redone {
                self.prune_selection();
            }
            redone
        }

        /// 通过可撤销命令向页面添加控件。
        pub fn add_widget(&mut self, page_id: &str, widget: WidgetModel) -> Result<(), EngineError> {
            self.ensure_page(page_id)?;
            if self.store.state().widget(&widget.id).is_some() {
                return Err(EngineError::DuplicateWidget(widget.id));
            }
            self.execute(Box::new(AddWidgetCommand::new(page_id, widget)));
            Ok(())
        }

        pub fn update_widget(&mut self, widget_id: &str, changes: WidgetPatch) -> Result<(), EngineError> {
            self.update_widget_at(widget_id, changes, Instant::now())
        }

        /// 以指定的发出时刻修改控件，合并窗口按该时刻计算。
        pub fn update_widget_at(
            &mut self,
            widget_id: &str,
            changes: WidgetPatch,
            issued_at: Instant,
        ) -> Result<(), EngineError> {
            self.ensure_widget(widget_id)?;
            if let Some(page_id) = &changes.page_id {
                self.ensure_page(page_id)?;
            }
            let command = UpdateWidgetCommand::issued_at(widget_id, changes, issued_at)
                .with_merge_window(self.merge_window);
            self.execute(Box::new(command));
            Ok(())
        }

        pub fn delete_widget(&mut self, widget_id: &str) -> Result<(), EngineError> {
            let page_id = self.ensure_widget(widget_id)?.page_id.clone();
            self.execute(Box::new(DeleteWidgetCommand::new(page_id, widget_id)));
            self.selected.remove(widget_id);
            Ok(())
        }

        /// 异步创建的控件加载完成：把最终形态写入状态，并改写对应添加命令的快照。
        ///
        /// 返回历史中的快照是否被改写。
        pub fn complete_widget(&mut self, widget: WidgetModel) -> Result<bool, EngineError> {
            let page_id = self.ensure_widget(&widget.id)?.page_id.clone();
            let widget_id = widget.id.clone();
            self.store.dispatch(DocumentIntent::UpdateWidget {
                widget_id: widget_id.clone(),
                changes: WidgetPatch::restore(&Widget::from_model(&page_id, &widget)),
            });
            Ok(self.history.update_last_add_widget_snapshot(&widget_id, widget))
        }

        /// 异步创建失败：移除占位控件，并丢弃对应的添加命令。
        pub fn abandon_widget(&mut self, widget_id: &str) -> Result<bool, EngineError> {
            let page_id = self.ensure_widget(widget_id)?.page_id.clone();
            self.store.dispatch(DocumentIntent::DeleteWidget {
                page_id,
                widget_id: widget_id.to_string(),
            });
            self.selected.remove(widget_id);
            Ok(self.history.drop_last_add_widget_command(widget_id))
        }

        /// 返回当前选中控件数量。
        #[inline]
        pub fn selection_len(&self) -> usize {
            self.selected.len()
        }

        #[inline]
        pub fn is_selected(&self, widget_id: &str) -> bool {
            self.selected.contains(widget_id)
        }

        /// 选中指定控件。若控件不存在则返回错误。
        pub fn select(&mut self, widget_id: &str) -> Result<(), EngineError> {
            self.ensure_widget(widget_id)?;
            self.selected.insert(widget_id.to_string());
            Ok(())
        }

        /// 取消选中，返回之前是否处于选中状态。
        pub fn deselect(&mut self, widget_id: &str) -> bool {
            self.selected.remove(widget_id)
        }

        /// 切换选中状态，返回切换后的状态。
        pub fn toggle_selection(&mut self, widget_id: &str) -> Result<bool, EngineError> {
            self.ensure_widget(widget_id)?;
            if self.selected.remove(widget_id) {
                Ok(false)
            } else {
                self.selected.insert(widget_id.to_string());
                Ok(true)
            }
        }

        #[inline]
        pub fn clear_selection(&mut self) {
            self.selected.clear();
        }

        /// 选中控件 ID，按字典序排列。
        pub fn selection(&self) -> Vec<&str> {
            let mut ids: Vec<&str> = self.selected.iter().map(String::as_str).collect();
            ids.sort_unstable();
            ids
        }

        /// 选中控件的外接矩形。
        pub fn selection_bounds(&self) -> Option<Rect> {
            self.selected
                .iter()
                .filter_map(|id| self.store.state().widget(id))
                .map(|widget| Rect::from_origin_size(widget.position, widget.size))
                .reduce(|acc, rect| acc.union(&rect))
        }

        #[inline]
        pub fn viewport(&self) -> ViewportState {
            self.viewport
        }

        /// 设置缩放倍数（限制在合法范围内），变化会记入缩放历史。
        pub fn set_zoom(&mut self, zoom: f64) {
            let target = ViewportState::clamp_zoom(zoom);
            if (target - self.viewport.zoom).abs() < f64::EPSILON {
                return;
            }
            self.history.push_zoom(self.viewport.zoom);
            self.viewport.zoom = target;
        }

        /// 按乘法因子调整缩放。
        pub fn scale_zoom(&mut self, factor: f64) {
            if factor.is_finite() {
                self.set_zoom(self.viewport.zoom * factor);
            }
        }

        pub fn undo_zoom(&mut self) -> bool {
            match self.history.undo_zoom(self.viewport.zoom) {
                Some(zoom) => {
                    self.viewport.zoom = zoom;
                    true
                }
                None => false,
            }
        }

        pub fn redo_zoom(&mut self) -> bool {
            match self.history.redo_zoom(self.viewport.zoom) {
                Some(zoom) => {
                    self.viewport.zoom = zoom;
                    true
                }
                None => false,
            }
        }

        #[inline]
        pub fn cursor(&self) -> &NavigationCursor {
            &self.cursor
        }

        /// 切换激活的子章节与页面。页面必须属于该子章节。
        pub fn navigate(&mut self, cursor: NavigationCursor) -> Result<(), EngineError> {
            let state = self.store.state();
            if let Some(subsection_id) = &cursor.subsection_id {
                if state.subsection(subsection_id).is_none() {
                    return Err(EngineError::SubsectionNotFound(subsection_id.clone()));
                }
            }
            if let Some(page_id) = &cursor.page_id {
                let page = state
                    .page(page_id)
                    .ok_or_else(|| EngineError::PageNotFound(page_id.clone()))?;
                if let Some(subsection_id) = &cursor.subsection_id {
                    if page.subsection_id != *subsection_id {
                        return Err(EngineError::PageOutsideSubsection {
                            subsection_id: subsection_id.clone(),
                            page_id: page_id.clone(),
                        });
                    }
                }
            }
            if self.cursor != cursor {
                self.selected.clear();
            }
            self.cursor = cursor;
            Ok(())
        }

        /// 复制选中控件到剪贴板，返回复制数量。
        pub fn copy_selection(&mut self) -> usize {
            let state = self.store.state();
            let mut copied: Vec<(usize, WidgetModel)> = self
                .selected
                .iter()
                .filter_map(|id| state.widget(id))
                .map(|widget| {
                    let order = state
                        .widget_ids(&widget.page_id)
                        .iter()
                        .position(|id| *id == widget.id)
                        .unwrap_or(usize::MAX);
                    (order, widget.to_model())
                })
                .collect();
            copied.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
            self.clipboard = copied.into_iter().map(|(_, widget)| widget).collect();
            self.clipboard.len()
        }

        #[inline]
        pub fn clipboard(&self) -> &[WidgetModel] {
            &self.clipboard
        }

        /// 把剪贴板中的控件粘贴到页面：使用新 ID、整体偏移，每个控件各占一步撤销记录。
        ///
        /// 返回新控件 ID，粘贴结果成为新的选中集。
        pub fn paste(&mut self, page_id: &str) -> Result<Vec<String>, EngineError> {
            self.ensure_page(page_id)?;
            if self.clipboard.is_empty() {
                return Err(EngineError::ClipboardEmpty);
            }
            let pasted: Vec<WidgetModel> = self
                .clipboard
                .iter()
                .map(|widget| {
                    let mut copy = widget.clone();
                    copy.id = Uuid::new_v4().to_string();
                    copy.position = copy.position.translate(PASTE_OFFSET, PASTE_OFFSET);
                    copy
                })
                .collect();

            self.selected.clear();
            let mut ids = Vec::with_capacity(pasted.len());
            for widget in pasted {
                ids.push(widget.id.clone());
                self.selected.insert(widget.id.clone());
                self.execute(Box::new(AddWidgetCommand::new(page_id, widget)));
            }
            debug!(page_id, count = ids.len(), "已粘贴控件");
            Ok(ids)
        }

        /// 为 CLI / 快速验证加载一份两页示例报告，返回关键控件 ID。
        pub fn populate_demo(&mut self) -> DemoWidgets {
            let ids = DemoWidgets {
                headline: "demo-headline".to_string(),
                revenue_chart: "demo-revenue".to_string(),
                trend_chart: "demo-trend".to_string(),
            };

            let headline = WidgetModel::new(
                ids.headline.as_str(),
                WidgetProps::Text(TextWidgetProps {
                    content: "季度经营报告".to_string(),
                    font_size: Some(24.0),
                    ..TextWidgetProps::default()
                }),
            )
            .with_position(40.0, 40.0)
            .with_size(500.0, 48.0);
            let revenue = WidgetModel::new(
                ids.revenue_chart.as_str(),
                WidgetProps::Chart(demo_chart(ChartType::Bar, "营收", &[120.0, 132.0, 101.0, 134.0])),
            )
            .with_position(40.0, 120.0)
            .with_size(480.0, 280.0);
            let trend = WidgetModel::new(
                ids.trend_chart.as_str(),
                WidgetProps::Chart(demo_chart(ChartType::Line, "趋势", &[82.0, 93.0, 90.0, 129.0])),
            )
            .with_position(40.0, 40.0)
            .with_size(480.0, 280.0);

            let mut document = DocumentModel::new("demo", "演示报告");
            document.sections.push(
                SectionModel::new("demo-section", "经营概览").with_subsection(
                    SubsectionModel::new("demo-subsection", "季度数据")
                        .with_page(
                            PageModel::new("demo-page-1", 1)
                                .with_widget(headline)
                                .with_widget(revenue),
                        )
                        .with_page(PageModel::new("demo-page-2", 2).with_widget(trend)),
                ),
            );
            self.load_document(&document);

            debug!(
                headline = %ids.headline,
                revenue_chart = %ids.revenue_chart,
                trend_chart = %ids.trend_chart,
                "已创建演示文档"
            );
            ids
        }

        fn ensure_page(&self, page_id: &str) -> Result<(), EngineError> {
            if self.store.state().meta().is_none() {
                return Err(EngineError::DocumentNotLoaded);
            }
            self.store
                .state()
                .page(page_id)
                .map(|_| ())
                .ok_or_else(|| EngineError::PageNotFound(page_id.to_string()))
        }

        fn ensure_widget(&self, widget_id: &str) -> Result<&Widget, EngineError> {
            self.store
                .state()
                .widget(widget_id)
                .ok_or_else(|| EngineError::WidgetNotFound(widget_id.to_string()))
        }

        fn prune_selection(&mut self) {
            let state = self.store.state();
            self.selected.retain(|id| state.widget(id).is_some());
        }
    }

    impl Default for EditorSession {
        fn default() -> Self {
            Self::new()
        }
    }

    fn first_page_cursor(document: &DocumentModel) -> NavigationCursor {
        document
            .sections
            .iter()
            .flat_map(|section| section.subsections.iter())
            .find_map(|subsection| {
                subsection
                    .pages
                    .first()
                    .map(|page| NavigationCursor::new(subsection.id.as_str(), page.id.as_str()))
            })
            .unwrap_or_default()
    }

    fn demo_chart(chart_type: ChartType, name: &str, values: &[f64]) -> ChartWidgetProps {
        ChartWidgetProps {
            title: Some(name.to_string()),
            data: ChartData {
                labels: ["Q1", "Q2", "Q3", "Q4"].map(String::from).to_vec(),
                series: vec![ChartSeries {
                    name: name.to_string(),
                    values: values.to_vec(),
                    color: None,
                }],
            },
            ..ChartWidgetProps::new(chart_type)
        }
    }

    #[cfg(test)]
    mod tests {
        use docforge_core::geometry::Position;
        use serde_json::json;

        use super::*;

        fn demo_session() -> (EditorSession, DemoWidgets) {
            let mut session = EditorSession::new();
            let ids = session.populate_demo();
            (session, ids)
        }

        #[test]
        fn demo_population_loads_two_pages() {
            let (session, ids) = demo_session();
            let state = session.store().state();
            assert_eq!(state.pages().len(), 2);
            assert_eq!(state.widgets().len(), 3);
            assert!(state.widget(&ids.trend_chart).is_some());
            assert_eq!(
                session.cursor(),
                &NavigationCursor::new("demo-subsection", "demo-page-1")
            );
            assert!(!session.history().can_undo_document());
        }

        #[test]
        fn selection_operations_work() {
            let (mut session, ids) = demo_session();

            session.select(&ids.headline).expect("select headline");
            assert!(session.is_selected(&ids.headline));

            let now_selected = session
                .toggle_selection(&ids.headline)
                .expect("toggle existing selection");
            assert!(!now_selected);
            assert!(session.toggle_selection(&ids.headline).expect("toggle again"));

            assert!(session.deselect(&ids.headline));
            assert!(!session.deselect(&ids.headline));
            assert_eq!(session.selection_len(), 0);

            let err = session.select("missing").unwrap_err();
            assert!(matches!(err, EngineError::WidgetNotFound(_)));
        }

        #[test]
        fn selection_bounds_cover_selected_widgets() {
            let (mut session, ids) = demo_session();
            assert!(session.selection_bounds().is_none());
            session.select(&ids.headline).unwrap();
            session.select(&ids.revenue_chart).unwrap();
            let bounds = session.selection_bounds().expect("bounds");
            assert_eq!(bounds.min(), Position::new(40.0, 40.0));
            assert_eq!(bounds.max(), Position::new(540.0, 400.0));
        }

        #[test]
        fn zoom_is_clamped_and_tracked_separately() {
            let (mut session, ids) = demo_session();
            session.set_zoom(2.0);
            session.scale_zoom(10.0);
            assert!((session.viewport().zoom - MAX_ZOOM).abs() < f64::EPSILON);
            session.set_zoom(0.0001);
            assert!((session.viewport().zoom - MIN_ZOOM).abs() < f64::EPSILON);

            session.delete_widget(&ids.headline).unwrap();

            assert!(session.undo_zoom());
            assert!((session.viewport().zoom - MAX_ZOOM).abs() < f64::EPSILON);
            assert!(session.store().state().widget(&ids.headline).is_none());

            assert!(session.undo());
            assert!(session.store().state().widget(&ids.headline).is_some());
            assert!((session.viewport().zoom - MAX_ZOOM).abs() < f64::EPSILON);

            assert!(session.redo_zoom());
            assert!((session.viewport().zoom - MIN_ZOOM).abs() < f64::EPSILON);
        }

        #[test]
        fn props_edits_within_window_undo_in_one_step() {
            let mut session = EditorSession::with_limits(10, Duration::from_millis(800));
            let ids = session.populate_demo();
            let start = Instant::now();
            for (offset, title) in [(0, "a"), (100, "b"), (200, "c")] {
                session
                    .update_widget_at(
                        &ids.revenue_chart,
                        WidgetPatch::props([("title".to_string(), json!(title))].into_iter().collect()),
                        start + Duration::from_millis(offset),
                    )
                    .unwrap();
            }
            assert_eq!(session.history().undo_len(), 1);
            assert!(session.undo());
            let widget = session.store().state().widget(&ids.revenue_chart).unwrap();
            assert_eq!(
                widget.props.as_chart().and_then(|chart| chart.title.as_deref()),
                Some("营收")
            );
        }

        #[test]
        fn copy_paste_mints_new_ids_and_is_undoable() {
            let (mut session, ids) = demo_session();
            session.select(&ids.revenue_chart).unwrap();
            assert_eq!(session.copy_selection(), 1);

            let pasted = session.paste("demo-page-2").expect("paste");
            assert_eq!(pasted.len(), 1);
            assert_ne!(pasted[0], ids.revenue_chart);
            assert!(session.is_selected(&pasted[0]));

            let copy = session.store().state().widget(&pasted[0]).unwrap();
            assert_eq!(copy.page_id, "demo-page-2");
            assert_eq!(copy.position, Position::new(50.0, 130.0));

            assert!(session.undo());
            assert!(session.store().state().widget(&pasted[0]).is_none());
            assert_eq!(session.selection_len(), 0);

            let err = session.paste("missing").unwrap_err();
            assert!(matches!(err, EngineError::PageNotFound(_)));
        }

        #[test]
        fn paste_with_empty_clipboard_fails() {
            let (mut session, _) = demo_session();
            let err = session.paste("demo-page-1").unwrap_err();
            assert!(matches!(err, EngineError::ClipboardEmpty));
        }

        #[test]
        fn navigate_validates_page_membership() {
            let (mut session, ids) = demo_session();
            session.select(&ids.headline).unwrap();

            session
                .navigate(NavigationCursor::new("demo-subsection", "demo-page-2"))
                .expect("navigate to page 2");
            assert_eq!(session.cursor().page_id.as_deref(), Some("demo-page-2"));
            assert_eq!(session.selection_len(), 0);

            let err = session
                .navigate(NavigationCursor::new("demo-subsection", "ghost"))
                .unwrap_err();
            assert!(matches!(err, EngineError::PageNotFound(_)));
            let err = session
                .navigate(NavigationCursor::new("ghost", "demo-page-1"))
                .unwrap_err();
            assert!(matches!(err, EngineError::SubsectionNotFound(_)));
        }

        #[test]
        fn async_widget_completion_rewrites_undo_snapshot() {
            let (mut session, _) = demo_session();
            let placeholder = WidgetModel::new(
                "async-chart",
                WidgetProps::Chart(ChartWidgetProps::new(ChartType::Bar)),
            );
            session.add_widget("demo-page-1", placeholder).unwrap();

            let loaded = WidgetModel::new(
                "async-chart",
                WidgetProps::Chart(demo_chart(ChartType::Bar, "加载完成", &[1.0, 2.0])),
            )
            .with_size(320.0, 200.0);
            assert!(session.complete_widget(loaded.clone()).unwrap());

            assert!(session.undo());
            assert!(session.store().state().widget("async-chart").is_none());
            assert!(session.redo());
            assert_eq!(
                session.store().state().widget("async-chart").unwrap().to_model(),
                loaded
            );
        }

        #[test]
        fn abandoned_widget_leaves_no_history() {
            let (mut session, _) = demo_session();
            let placeholder =
                WidgetModel::new("broken", WidgetProps::Text(TextWidgetProps::default()));
            session.add_widget("demo-page-1", placeholder.clone()).unwrap();
            assert!(session.abandon_widget("broken").unwrap());
            assert!(session.store().state().widget("broken").is_none());
            assert!(!session.history().can_undo_document());

            let err = session.add_widget("ghost", placeholder).unwrap_err();
            assert!(matches!(err, EngineError::PageNotFound(_)));
        }

        #[test]
        fn operations_require_loaded_document() {
            let mut session = EditorSession::default();
            let widget = WidgetModel::new("w", WidgetProps::Text(TextWidgetProps::default()));
            let err = session.add_widget("p", widget).unwrap_err();
            assert!(matches!(err, EngineError::DocumentNotLoaded));
            assert!(session.document().is_none());
        }
    }
}
