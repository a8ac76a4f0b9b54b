use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::{debug, trace};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    #[default]
    Pending,
    Rendering,
    Rendered,
    Error,
}

impl RenderStatus {
    /// `Rendered` 与 `Error` 都是终态，等待方不再继续等待。
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, RenderStatus::Rendered | RenderStatus::Error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRenderState {
    pub status: RenderStatus,
    pub subsection_id: Option<String>,
    pub page_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Registered { widget_id: String },
    StateChanged { widget_id: String, state: ChartRenderState },
    Unregistered { widget_id: String },
    ExportMode(bool),
}

#[derive(Debug, Default)]
struct RegistryInner {
    charts: HashMap<String, ChartRenderState>,
    export_mode: bool,
}

/// 图表渲染就绪登记表。
///
/// 图表控件挂载时登记，绘制完成后标记终态；导出流程据此决定何时截图。
/// 状态检查与订阅在同一把锁内完成，状态变化也在该锁内广播，等待方不会错过任何变化。
#[derive(Debug)]
pub struct ChartRenderRegistry {
    inner: Mutex<RegistryInner>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Default for ChartRenderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartRenderRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Mutex::new(RegistryInner::default()),
            events,
        }
    }

    /// 登记图表为 `Pending`。重复登记会重置为 `Pending`。
    pub fn register(&self, widget_id: &str, subsection_id: Option<&str>, page_id: Option<&str>) {
        let mut inner = self.inner.lock();
        inner.charts.insert(
            widget_id.to_string(),
            ChartRenderState {
                status: RenderStatus::Pending,
                subsection_id: subsection_id.map(str::to_string),
                page_id: page_id.map(str::to_string),
                error: None,
            },
        );
        trace!(widget_id, "图表已登记");
        let _ = self.events.send(RegistryEvent::Registered {
            widget_id: widget_id.to_string(),
        });
    }

    pub fn unregister(&self, widget_id: &str) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.charts.remove(widget_id).is_some();
        if removed {
            let _ = self.events.send(RegistryEvent::Unregistered {
                widget_id: widget_id.to_string(),
            });
        }
        removed
    }

    pub fn mark_rendering(&self, widget_id: &str) -> bool {
        self.transition(widget_id, RenderStatus::Rendering, None)
    }

    pub fn mark_rendered(&self, widget_id: &str) -> bool {
        self.transition(widget_id, RenderStatus::Rendered, None)
    }

    pub fn mark_error(&self, widget_id: &str, reason: impl Into<String>) -> bool {
        self.transition(widget_id, RenderStatus::Error, Some(reason.into()))
    }

    fn transition(&self, widget_id: &str, status: RenderStatus, error: Option<String>) -> bool {
        let mut inner = self.inner.lock();
        let Some(state) = inner.charts.get_mut(widget_id) else {
            debug!(widget_id, ?status, "未登记的图表，忽略状态变化");
            return false;
        };
        state.status = status;
        state.error = error;
        let state = state.clone();
        let _ = self.events.send(RegistryEvent::StateChanged {
            widget_id: widget_id.to_string(),
            state,
        });
        true
    }

    pub fn enter_export_mode(&self) {
        self.set_export_mode(true);
    }

    pub fn exit_export_mode(&self) {
        self.set_export_mode(false);
    }

    fn set_export_mode(&self, enabled: bool) {
        let mut inner = self.inner.lock();
        if inner.export_mode != enabled {
            inner.export_mode = enabled;
            let _ = self.events.send(RegistryEvent::ExportMode(enabled));
        }
    }

    /// 导出模式下，不在可视区域内的图表也应立即渲染。
    pub fn is_export_mode(&self) -> bool {
        self.inner.lock().export_mode
    }

    pub fn get_state(&self, widget_id: &str) -> Option<ChartRenderState> {
        self.inner.lock().charts.get(widget_id).cloned()
    }

    pub fn is_rendered(&self, widget_id: &str) -> bool {
        self.inner
            .lock()
            .charts
            .get(widget_id)
            .is_some_and(|state| state.status == RenderStatus::Rendered)
    }

    pub fn is_registered(&self, widget_id: &str) -> bool {
        self.inner.lock().charts.contains_key(widget_id)
    }

    /// 所有已登记图表都处于终态；空登记表视为全部完成。
    pub fn all_rendered(&self) -> bool {
        self.inner
            .lock()
            .charts
            .values()
            .all(|state| state.status.is_terminal())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// 等待图表进入终态。已处于终态时立即返回；本层不设超时，由调用方限定。
    pub async fn wait_for_chart(&self, widget_id: &str) -> ChartRenderState {
        let mut receiver = {
            let inner = self.inner.lock();
            if let Some(state) = inner.charts.get(widget_id) {
                if state.status.is_terminal() {
                    return state.clone();
                }
            }
            self.events.subscribe()
        };

        loop {
            match receiver.recv().await {
                Ok(RegistryEvent::StateChanged { widget_id: id, state })
                    if id == widget_id && state.status.is_terminal() =>
                {
                    return state;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(widget_id, skipped, "登记表事件积压，重新读取当前状态");
                    if let Some(state) = self.get_state(widget_id) {
                        if state.status.is_terminal() {
                            return state;
                        }
                    }
                }
                Err(RecvError::Closed) => return self.get_state(widget_id).unwrap_or_default(),
            }
        }
    }

    /// 并发等待一组图表，全部进入终态后返回各自的状态。
    pub async fn wait_for_charts<S: AsRef<str>>(
        &self,
        widget_ids: &[S],
    ) -> HashMap<String, ChartRenderState> {
        let states = join_all(
            widget_ids
                .iter()
                .map(|id| self.wait_for_chart(id.as_ref())),
        )
        .await;
        widget_ids
            .iter()
            .map(|id| id.as_ref().to_string())
            .zip(states)
            .collect()
    }

    /// 等待一组图表完成登记，最多等待 `timeout`。返回超时仍未登记的 ID。
    pub async fn wait_for_registration<S: AsRef<str>>(
        &self,
        widget_ids: &[S],
        timeout: Duration,
    ) -> Vec<String> {
        let deadline = Instant::now() + timeout;
        let mut receiver = {
            let inner = self.inner.lock();
            let missing = Self::missing(&inner, widget_ids);
            if missing.is_empty() {
                return missing;
            }
            self.events.subscribe()
        };

        loop {
            match tokio::time::timeout_at(deadline, receiver.recv()).await {
                Ok(Ok(RegistryEvent::Registered { .. })) | Ok(Err(RecvError::Lagged(_))) => {
                    let missing = Self::missing(&self.inner.lock(), widget_ids);
                    if missing.is_empty() {
                        return missing;
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(RecvError::Closed)) | Err(_) => {
                    return Self::missing(&self.inner.lock(), widget_ids);
                }
            }
        }
    }

    fn missing<S: AsRef<str>>(inner: &RegistryInner, widget_ids: &[S]) -> Vec<String> {
        widget_ids
            .iter()
            .map(|id| id.as_ref())
            .filter(|id: &&str| !inner.charts.contains_key(*id))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn wait_resolves_on_transition_and_then_immediately() {
        let registry = Arc::new(ChartRenderRegistry::new());
        registry.register("w1", None, None);

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait_for_chart("w1").await })
        };
        tokio::task::yield_now().await;
        registry.mark_rendering("w1");
        registry.mark_rendered("w1");

        let state = waiter.await.expect("waiter task");
        assert_eq!(state.status, RenderStatus::Rendered);

        let again = tokio::time::timeout(Duration::from_millis(50), registry.wait_for_chart("w1"))
            .await
            .expect("already rendered chart must not wait");
        assert_eq!(again.status, RenderStatus::Rendered);
    }

    #[tokio::test]
    async fn wait_issued_before_registration_observes_terminal_state() {
        let registry = Arc::new(ChartRenderRegistry::new());
        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait_for_chart("late").await })
        };
        tokio::task::yield_now().await;
        registry.register("late", Some("ss"), Some("p"));
        registry.mark_error("late", "adapter failed");

        let state = waiter.await.expect("waiter task");
        assert_eq!(state.status, RenderStatus::Error);
        assert_eq!(state.error.as_deref(), Some("adapter failed"));
        assert_eq!(state.page_id.as_deref(), Some("p"));
    }

    #[test]
    fn transitions_on_unknown_ids_are_ignored() {
        let registry = ChartRenderRegistry::new();
        assert!(!registry.mark_rendered("ghost"));
        assert!(registry.get_state("ghost").is_none());
        assert!(registry.all_rendered());

        registry.register("w1", None, None);
        assert!(!registry.all_rendered());
        registry.mark_error("w1", "boom");
        assert!(registry.all_rendered());
        assert!(!registry.is_rendered("w1"));

        registry.register("w1", None, None);
        assert_eq!(registry.get_state("w1").unwrap().status, RenderStatus::Pending);
        assert!(registry.unregister("w1"));
        assert!(!registry.unregister("w1"));
    }

    #[test]
    fn export_mode_is_broadcast_once_per_change() {
        let registry = ChartRenderRegistry::new();
        let mut events = registry.subscribe();
        registry.enter_export_mode();
        registry.enter_export_mode();
        assert!(registry.is_export_mode());
        registry.exit_export_mode();

        assert_eq!(events.try_recv().unwrap(), RegistryEvent::ExportMode(true));
        assert_eq!(events.try_recv().unwrap(), RegistryEvent::ExportMode(false));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn wait_for_charts_collects_every_state() {
        let registry = Arc::new(ChartRenderRegistry::new());
        registry.register("a", None, None);
        registry.register("b", None, None);
        registry.mark_rendered("a");

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait_for_charts(&["a", "b"]).await })
        };
        tokio::task::yield_now().await;
        registry.mark_error("b", "no data");

        let states = waiter.await.expect("waiter task");
        assert_eq!(states.len(), 2);
        assert_eq!(states["a"].status, RenderStatus::Rendered);
        assert_eq!(states["b"].status, RenderStatus::Error);
    }

    #[tokio::test]
    async fn registration_wait_reports_missing_ids_after_timeout() {
        let registry = Arc::new(ChartRenderRegistry::new());
        registry.register("a", None, None);

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .wait_for_registration(&["a", "b", "c"], Duration::from_millis(100))
                    .await
            })
        };
        tokio::task::yield_now().await;
        registry.register("b", None, None);

        let missing = waiter.await.expect("waiter task");
        assert_eq!(missing, vec!["c".to_string()]);

        let none_missing = registry
            .wait_for_registration(&["a", "b"], Duration::from_millis(10))
            .await;
        assert!(none_missing.is_empty());
    }
}
