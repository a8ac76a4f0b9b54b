use std::collections::VecDeque;

use docforge_core::document::WidgetModel;
use tracing::{debug, trace};

use crate::command::{AddWidgetCommand, Command};
use crate::store::DocumentStore;

/// 撤销栈默认上限，超出后丢弃最旧的记录。
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// 两套互相独立的撤销/重做历史：文档命令与缩放级别。
#[derive(Debug)]
pub struct CommandHistory {
    undo: VecDeque<Box<dyn Command>>,
    redo: Vec<Box<dyn Command>>,
    zoom_undo: VecDeque<f64>,
    zoom_redo: Vec<f64>,
    max_entries: usize,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl CommandHistory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            zoom_undo: VecDeque::new(),
            zoom_redo: Vec::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// 执行命令并记入历史。
    ///
    /// 栈顶命令可以合并新命令时，合并后重新执行栈顶命令，不新增记录。
    pub fn execute_document_command(
        &mut self,
        store: &mut DocumentStore,
        mut command: Box<dyn Command>,
    ) {
        if let Some(top) = self.undo.back_mut() {
            if let Some(mergeable) = top.as_mergeable() {
                if mergeable.can_merge(command.as_ref()) {
                    mergeable.merge(command);
                    mergeable.execute(store);
                    self.redo.clear();
                    return;
                }
            }
        }

        command.execute(store);
        trace!(description = command.description(), "记录命令");
        self.undo.push_back(command);
        self.redo.clear();
        while self.undo.len() > self.max_entries {
            if let Some(evicted) = self.undo.pop_front() {
                debug!(description = evicted.description(), "撤销栈已满，丢弃最旧记录");
            }
        }
    }

    pub fn undo_document(&mut self, store: &mut DocumentStore) -> bool {
        let Some(mut command) = self.undo.pop_back() else {
            return false;
        };
        command.undo(store);
        self.redo.push(command);
        true
    }

    pub fn redo_document(&mut self, store: &mut DocumentStore) -> bool {
        let Some(mut command) = self.redo.pop() else {
            return false;
        };
        command.execute(store);
        self.undo.push_back(command);
        true
    }

    #[inline]
    pub fn can_undo_document(&self) -> bool {
        !self.undo.is_empty()
    }

    #[inline]
    pub fn can_redo_document(&self) -> bool {
        !self.redo.is_empty()
    }

    #[inline]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    #[inline]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// 撤销栈中的命令描述，最旧的在前。
    pub fn undo_descriptions(&self) -> impl Iterator<Item = &str> + '_ {
        self.undo.iter().map(|command| command.description())
    }

    /// 改写栈顶“添加控件”命令保存的快照，使撤销/重做针对最终加载完成的控件。
    ///
    /// 只检查栈顶；栈顶不是针对 `widget_id` 的添加命令时返回 `false`。
    pub fn update_last_add_widget_snapshot(
        &mut self,
        widget_id: &str,
        snapshot: WidgetModel,
    ) -> bool {
        match self.last_add_widget_mut(widget_id) {
            Some(command) => {
                command.replace_snapshot(snapshot);
                debug!(widget_id, "已更新异步创建控件的撤销快照");
                true
            }
            None => false,
        }
    }

    /// 异步创建失败时移除栈顶的“添加控件”命令，不留下撤销步骤。
    pub fn drop_last_add_widget_command(&mut self, widget_id: &str) -> bool {
        if self.last_add_widget_mut(widget_id).is_none() {
            return false;
        }
        self.undo.pop_back();
        debug!(widget_id, "已移除失败的添加控件命令");
        true
    }

    fn last_add_widget_mut(&mut self, widget_id: &str) -> Option<&mut AddWidgetCommand> {
        self.undo
            .back_mut()?
            .as_any_mut()
            .downcast_mut::<AddWidgetCommand>()
            .filter(|command| command.widget_id() == widget_id)
    }

    /// 记录一次缩放变化，`previous` 为变化前的缩放级别。
    pub fn push_zoom(&mut self, previous: f64) {
        self.zoom_undo.push_back(previous);
        self.zoom_redo.clear();
        while self.zoom_undo.len() > self.max_entries {
            self.zoom_undo.pop_front();
        }
    }

    /// 返回应恢复到的缩放级别；`current` 进入重做栈。
    pub fn undo_zoom(&mut self, current: f64) -> Option<f64> {
        let previous = self.zoom_undo.pop_back()?;
        self.zoom_redo.push(current);
        Some(previous)
    }

    pub fn redo_zoom(&mut self, current: f64) -> Option<f64> {
        let next = self.zoom_redo.pop()?;
        self.zoom_undo.push_back(current);
        Some(next)
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.zoom_undo.clear();
        self.zoom_redo.clear();
    }
}
