use std::any::Any;
use std::fmt;
use std::time::{Duration, Instant};

use docforge_core::document::WidgetModel;
use docforge_core::normalized::{NormalizedDocumentState, PagePatch, Widget, WidgetPatch};
use tracing::debug;

use crate::store::{DocumentIntent, DocumentStore};

/// 连续属性修改的默认合并窗口。
pub const DEFAULT_MERGE_WINDOW: Duration = Duration::from_millis(800);

/// 可撤销的文档修改。
pub trait Command: fmt::Debug {
    fn execute(&mut self, store: &mut DocumentStore);
    fn undo(&mut self, store: &mut DocumentStore);
    fn description(&self) -> &str;

    /// 支持合并的命令返回自身。
    fn as_mergeable(&mut self) -> Option<&mut dyn MergeableCommand> {
        None
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// 可以把紧随其后的同类命令并入自身的命令。
pub trait MergeableCommand: Command {
    fn can_merge(&self, next: &dyn Command) -> bool;
    fn merge(&mut self, next: Box<dyn Command>);
}

/// 添加控件。撤销时删除该控件。
///
/// 异步创建的控件先以占位形态加入，内容到达后由
/// [`CommandHistory::update_last_add_widget_snapshot`](crate::history::CommandHistory::update_last_add_widget_snapshot)
/// 改写这里保存的快照。
#[derive(Debug)]
pub struct AddWidgetCommand {
    page_id: String,
    widget: WidgetModel,
    index: Option<usize>,
    applied: bool,
    description: String,
}

impl AddWidgetCommand {
    pub fn new(page_id: impl Into<String>, widget: WidgetModel) -> Self {
        let description = format!("添加{}控件", widget.kind().as_str());
        Self {
            page_id: page_id.into(),
            widget,
            index: None,
            applied: false,
            description,
        }
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    #[inline]
    pub fn widget_id(&self) -> &str {
        &self.widget.id
    }

    #[inline]
    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    #[inline]
    pub fn snapshot(&self) -> &WidgetModel {
        &self.widget
    }

    /// 替换重做时要恢复的控件内容，不产生新的历史记录。
    pub fn replace_snapshot(&mut self, widget: WidgetModel) {
        self.widget = widget;
    }
}

impl Command for AddWidgetCommand {
    fn execute(&mut self, store: &mut DocumentStore) {
        let existed = store.state().widget(&self.widget.id).is_some();
        store.dispatch(DocumentIntent::AddWidget {
            page_id: self.page_id.clone(),
            widget: self.widget.clone(),
            index: self.index,
        });
        self.applied = !existed && store.state().widget(&self.widget.id).is_some();
    }

    fn undo(&mut self, store: &mut DocumentStore) {
        if !self.applied {
            return;
        }
        store.dispatch(DocumentIntent::DeleteWidget {
            page_id: self.page_id.clone(),
            widget_id: self.widget.id.clone(),
        });
        self.applied = false;
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// 修改控件。撤销时把控件完整还原为首次执行前的样子，跨页移动会回到原页面的原位置。
///
/// 同一控件、仅涉及属性、且间隔不超过合并窗口的连续修改会合并为一步。
#[derive(Debug)]
pub struct UpdateWidgetCommand {
    widget_id: String,
    changes: WidgetPatch,
    /// 首次执行前的控件及其在所属页面中的位置。
    before: Option<(Widget, usize)>,
    last_issued_at: Instant,
    merge_window: Duration,
    description: String,
}

impl UpdateWidgetCommand {
    pub fn new(widget_id: impl Into<String>, changes: WidgetPatch) -> Self {
        Self::issued_at(widget_id, changes, Instant::now())
    }

    pub fn issued_at(widget_id: impl Into<String>, changes: WidgetPatch, at: Instant) -> Self {
        let description = if changes.is_props_only() {
            "修改控件属性"
        } else if changes.page_id.is_some() {
            "移动控件到其他页面"
        } else if changes.size.is_some() {
            "调整控件尺寸"
        } else if changes.position.is_some() {
            "移动控件"
        } else {
            "修改控件"
        };
        Self {
            widget_id: widget_id.into(),
            changes,
            before: None,
            last_issued_at: at,
            merge_window: DEFAULT_MERGE_WINDOW,
            description: description.to_string(),
        }
    }

    pub fn with_merge_window(mut self, window: Duration) -> Self {
        self.merge_window = window;
        self
    }

    #[inline]
    pub fn widget_id(&self) -> &str {
        &self.widget_id
    }

    #[inline]
    pub fn changes(&self) -> &WidgetPatch {
        &self.changes
    }
}

impl Command for UpdateWidgetCommand {
    fn execute(&mut self, store: &mut DocumentStore) {
        if self.before.is_none() {
            let state = store.state();
            self.before = state.widget(&self.widget_id).and_then(|widget| {
                let index = state
                    .widget_ids(&widget.page_id)
                    .iter()
                    .position(|id| *id == self.widget_id)?;
                Some((widget.clone(), index))
            });
        }
        store.dispatch(DocumentIntent::UpdateWidget {
            widget_id: self.widget_id.clone(),
            changes: self.changes.clone(),
        });
    }

    fn undo(&mut self, store: &mut DocumentStore) {
        if let Some((before, index)) = &self.before {
            store.dispatch(DocumentIntent::UpdateWidget {
                widget_id: self.widget_id.clone(),
                changes: WidgetPatch::restore_at(before, *index),
            });
        }
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn as_mergeable(&mut self) -> Option<&mut dyn MergeableCommand> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl MergeableCommand for UpdateWidgetCommand {
    fn can_merge(&self, next: &dyn Command) -> bool {
        let Some(next) = next.as_any().downcast_ref::<UpdateWidgetCommand>() else {
            return false;
        };
        next.widget_id == self.widget_id
            && self.changes.is_props_only()
            && next.changes.is_props_only()
            && next
                .last_issued_at
                .saturating_duration_since(self.last_issued_at)
                <= self.merge_window
    }

    fn merge(&mut self, next: Box<dyn Command>) {
        if let Some(next) = next.as_any().downcast_ref::<UpdateWidgetCommand>() {
            self.changes.absorb(next.changes.clone());
            self.last_issued_at = next.last_issued_at;
            debug!(widget_id = %self.widget_id, "合并连续的属性修改");
        }
    }
}

/// 删除控件。撤销时把控件放回原页面的原位置。
#[derive(Debug)]
pub struct DeleteWidgetCommand {
    page_id: String,
    widget_id: String,
    removed: Option<(Widget, usize)>,
    description: String,
}

impl DeleteWidgetCommand {
    pub fn new(page_id: impl Into<String>, widget_id: impl Into<String>) -> Self {
        Self {
            page_id: page_id.into(),
            widget_id: widget_id.into(),
            removed: None,
            description: "删除控件".to_string(),
        }
    }
}

impl Command for DeleteWidgetCommand {
    fn execute(&mut self, store: &mut DocumentStore) {
        let state = store.state();
        self.removed = state
            .widget(&self.widget_id)
            .filter(|widget| widget.page_id == self.page_id)
            .and_then(|widget| {
                let index = state
                    .widget_ids(&self.page_id)
                    .iter()
                    .position(|id| *id == self.widget_id)?;
                Some((widget.clone(), index))
            });
        store.dispatch(DocumentIntent::DeleteWidget {
            page_id: self.page_id.clone(),
            widget_id: self.widget_id.clone(),
        });
    }

    fn undo(&mut self, store: &mut DocumentStore) {
        if let Some((widget, index)) = self.removed.take() {
            store.dispatch(DocumentIntent::AddWidget {
                page_id: widget.page_id.clone(),
                widget: widget.to_model(),
                index: Some(index),
            });
        }
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameTarget {
    Section,
    Subsection,
    Page,
}

/// 重命名章节、子章节或页面。撤销时恢复原标题。
#[derive(Debug)]
pub struct RenameCommand {
    target: RenameTarget,
    id: String,
    title: String,
    previous: Option<Option<String>>,
    description: String,
}

impl RenameCommand {
    pub fn new(target: RenameTarget, id: impl Into<String>, title: impl Into<String>) -> Self {
        let description = match target {
            RenameTarget::Section => "重命名章节",
            RenameTarget::Subsection => "重命名子章节",
            RenameTarget::Page => "重命名页面",
        };
        Self {
            target,
            id: id.into(),
            title: title.into(),
            previous: None,
            description: description.to_string(),
        }
    }

    fn current_title(&self, state: &NormalizedDocumentState) -> Option<Option<String>> {
        match self.target {
            RenameTarget::Section => state.section(&self.id).map(|s| Some(s.title.clone())),
            RenameTarget::Subsection => state.subsection(&self.id).map(|s| Some(s.title.clone())),
            RenameTarget::Page => state.page(&self.id).map(|p| p.title.clone()),
        }
    }

    fn rename_intent(&self, title: String) -> DocumentIntent {
        match self.target {
            RenameTarget::Section => DocumentIntent::RenameSection {
                section_id: self.id.clone(),
                title,
            },
            RenameTarget::Subsection => DocumentIntent::RenameSubsection {
                subsection_id: self.id.clone(),
                title,
            },
            RenameTarget::Page => DocumentIntent::RenamePage {
                page_id: self.id.clone(),
                title,
            },
        }
    }
}

impl Command for RenameCommand {
    fn execute(&mut self, store: &mut DocumentStore) {
        self.previous = self.current_title(store.state());
        if self.previous.is_some() {
            store.dispatch(self.rename_intent(self.title.clone()));
        }
    }

    fn undo(&mut self, store: &mut DocumentStore) {
        match self.previous.take() {
            Some(Some(title)) => store.dispatch(self.rename_intent(title)),
            Some(None) => store.dispatch(DocumentIntent::UpdatePage {
                page_id: self.id.clone(),
                changes: PagePatch {
                    title: Some(None),
                    ..PagePatch::default()
                },
            }),
            None => {}
        }
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// 执行任意意图，撤销时用执行前的整份状态快照还原。
///
/// 适用于没有简洁逆操作的修改，例如级联删除章节或整体替换元信息。
#[derive(Debug)]
pub struct SnapshotCommand {
    intent: DocumentIntent,
    before: Option<NormalizedDocumentState>,
    description: String,
}

impl SnapshotCommand {
    pub fn new(intent: DocumentIntent, description: impl Into<String>) -> Self {
        Self {
            intent,
            before: None,
            description: description.into(),
        }
    }

    pub fn from_intent(intent: DocumentIntent) -> Self {
        let description = intent.name().to_string();
        Self::new(intent, description)
    }
}

impl Command for SnapshotCommand {
    fn execute(&mut self, store: &mut DocumentStore) {
        self.before = Some(store.state().clone());
        store.dispatch(self.intent.clone());
    }

    fn undo(&mut self, store: &mut DocumentStore) {
        if let Some(before) = self.before.take() {
            store.replace_state(before);
        }
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use docforge_core::document::{
        DocumentModel, PageModel, SectionModel, SubsectionModel, TextWidgetProps, WidgetProps,
    };
    use docforge_core::geometry::Position;
    use serde_json::json;

    use super::*;

    fn store() -> DocumentStore {
        let mut document = DocumentModel::new("doc", "Doc");
        document.sections.push(
            SectionModel::new("s1", "S").with_subsection(
                SubsectionModel::new("ss1", "SS")
                    .with_page(PageModel::new("p1", 1).with_widget(text("w1")))
                    .with_page(PageModel::new("p2", 2)),
            ),
        );
        DocumentStore::with_document(&document)
    }

    fn text(id: &str) -> WidgetModel {
        WidgetModel::new(
            id,
            WidgetProps::Text(TextWidgetProps {
                content: "a".to_string(),
                ..TextWidgetProps::default()
            }),
        )
    }

    fn props(content: &str) -> WidgetPatch {
        WidgetPatch::props([("content".to_string(), json!(content))].into_iter().collect())
    }

    #[test]
    fn add_widget_undo_removes_only_when_applied() {
        let mut store = store();
        let mut add = AddWidgetCommand::new("p1", text("w2"));
        add.execute(&mut store);
        assert_eq!(store.state().widget_ids("p1"), &["w1", "w2"]);
        add.undo(&mut store);
        assert!(store.state().widget("w2").is_none());

        let before = store.state().clone();
        let mut duplicate = AddWidgetCommand::new("p2", text("w1"));
        duplicate.execute(&mut store);
        duplicate.undo(&mut store);
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn update_widget_undo_restores_page_and_props() {
        let mut store = store();
        let before = store.state().clone();
        let mut changes = props("b");
        changes.page_id = Some("p2".to_string());
        changes.position = Some(Position::new(40.0, 40.0));
        let mut update = UpdateWidgetCommand::new("w1", changes);

        update.execute(&mut store);
        assert_eq!(store.state().widget("w1").unwrap().page_id, "p2");
        update.undo(&mut store);
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn cross_page_move_undo_returns_widget_to_its_slot() {
        let mut store = store();
        for id in ["w2", "w3"] {
            store.dispatch(DocumentIntent::AddWidget {
                page_id: "p1".to_string(),
                widget: text(id),
                index: None,
            });
        }
        let before = store.state().clone();

        let mut update = UpdateWidgetCommand::new("w1", WidgetPatch::move_to_page("p2"));
        update.execute(&mut store);
        assert_eq!(store.state().widget_ids("p1"), &["w2", "w3"]);
        assert_eq!(store.state().widget_ids("p2"), &["w1"]);

        update.undo(&mut store);
        assert_eq!(store.state().widget_ids("p1"), &["w1", "w2", "w3"]);
        assert_eq!(store.state(), &before);

        let mut middle = UpdateWidgetCommand::new("w2", WidgetPatch::move_to_page("p2"));
        middle.execute(&mut store);
        middle.undo(&mut store);
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn merge_requires_same_widget_props_only_and_window() {
        let start = Instant::now();
        let first = UpdateWidgetCommand::issued_at("w1", props("a"), start);

        let close = UpdateWidgetCommand::issued_at("w1", props("b"), start + Duration::from_millis(100));
        let late = UpdateWidgetCommand::issued_at("w1", props("c"), start + Duration::from_millis(900));
        let other = UpdateWidgetCommand::issued_at("w2", props("d"), start);
        let geometry = UpdateWidgetCommand::issued_at(
            "w1",
            WidgetPatch::position(Position::new(1.0, 1.0)),
            start,
        );
        let delete = DeleteWidgetCommand::new("p1", "w1");

        assert!(first.can_merge(&close));
        assert!(!first.can_merge(&late));
        assert!(!first.can_merge(&other));
        assert!(!first.can_merge(&geometry));
        assert!(!first.can_merge(&delete));
    }

    #[test]
    fn delete_widget_undo_restores_original_slot() {
        let mut store = store();
        store.dispatch(DocumentIntent::AddWidget {
            page_id: "p1".to_string(),
            widget: text("w2"),
            index: None,
        });
        let before = store.state().clone();

        let mut delete = DeleteWidgetCommand::new("p1", "w1");
        delete.execute(&mut store);
        assert_eq!(store.state().widget_ids("p1"), &["w2"]);
        delete.undo(&mut store);
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn rename_page_without_title_restores_none() {
        let mut store = store();
        let mut rename = RenameCommand::new(RenameTarget::Page, "p1", "Cover");
        rename.execute(&mut store);
        assert_eq!(store.state().page("p1").unwrap().title.as_deref(), Some("Cover"));
        rename.undo(&mut store);
        assert!(store.state().page("p1").unwrap().title.is_none());
    }

    #[test]
    fn snapshot_command_restores_cascaded_delete() {
        let mut store = store();
        let before = store.state().clone();
        let mut delete = SnapshotCommand::from_intent(DocumentIntent::DeleteSection {
            section_id: "s1".to_string(),
        });
        delete.execute(&mut store);
        assert!(store.state().widgets().is_empty());
        delete.undo(&mut store);
        assert_eq!(store.state(), &before);
    }
}
