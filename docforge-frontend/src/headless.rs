use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use docforge_core::document::DocumentModel;
use docforge_core::geometry::Size;
use docforge_core::navigation::NavigationCursor;
use docforge_engine::adapter::{ChartAdapterRegistry, ChartInstance, RenderContainer};
use docforge_export::{
    CaptureError, ChartCapturer, ChartRenderRegistry, ChartSurface, EditorNavigator,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

struct MountedChart {
    instance: Box<dyn ChartInstance>,
    size: Size,
}

/// 无界面的编辑器工作区：导航到页面时用图表适配器绘制该页图表，并向渲染登记表报告。
///
/// 同一时刻只挂载当前页面的图表，离开页面时销毁实例并注销登记。
pub struct HeadlessWorkspace {
    registry: Arc<ChartRenderRegistry>,
    adapters: ChartAdapterRegistry,
    document: DocumentModel,
    cursor: Mutex<NavigationCursor>,
    mounted: Mutex<HashMap<String, MountedChart>>,
}

impl HeadlessWorkspace {
    pub fn new(
        registry: Arc<ChartRenderRegistry>,
        document: DocumentModel,
        cursor: NavigationCursor,
    ) -> Self {
        Self {
            registry,
            adapters: ChartAdapterRegistry::with_builtin(),
            document,
            cursor: Mutex::new(cursor),
            mounted: Mutex::new(HashMap::new()),
        }
    }

    pub fn mounted_count(&self) -> usize {
        self.mounted.lock().len()
    }

    fn unmount_all(&self) {
        let drained: Vec<(String, MountedChart)> = self.mounted.lock().drain().collect();
        for (widget_id, mut chart) in drained {
            chart.instance.destroy();
            self.registry.unregister(&widget_id);
        }
    }

    fn mount_page(&self, cursor: &NavigationCursor) {
        let Some(page_id) = cursor.page_id.as_deref() else {
            return;
        };
        let Some(page) = self.document.pages().find(|page| page.id == page_id) else {
            warn!(page_id, "导航目标页面不存在");
            return;
        };

        for widget in &page.widgets {
            let Some(chart) = widget.props.as_chart() else {
                continue;
            };
            self.registry
                .register(&widget.id, cursor.subsection_id.as_deref(), Some(page_id));
            self.registry.mark_rendering(&widget.id);

            let Some(adapter) = self.adapters.get_adapter(&chart.provider) else {
                self.registry
                    .mark_error(&widget.id, format!("no adapter for provider {}", chart.provider));
                continue;
            };
            let container = RenderContainer::new(widget.id.as_str(), widget.size);
            match adapter.render(&container, chart) {
                Ok(instance) => {
                    self.mounted.lock().insert(
                        widget.id.clone(),
                        MountedChart {
                            instance,
                            size: widget.size,
                        },
                    );
                    self.registry.mark_rendered(&widget.id);
                }
                Err(err) => {
                    warn!(widget_id = %widget.id, error = %err, "图表绘制失败");
                    self.registry.mark_error(&widget.id, err.to_string());
                }
            }
        }
        debug!(page_id, mounted = self.mounted_count(), "页面图表已挂载");
    }
}

impl EditorNavigator for HeadlessWorkspace {
    fn current(&self) -> NavigationCursor {
        self.cursor.lock().clone()
    }

    fn navigate(&self, cursor: &NavigationCursor) {
        *self.cursor.lock() = cursor.clone();
        self.unmount_all();
        self.mount_page(cursor);
    }
}

/// 从工作区读取已挂载图表的 SVG。
pub struct HeadlessCapturer {
    workspace: Arc<HeadlessWorkspace>,
}

impl HeadlessCapturer {
    pub fn new(workspace: Arc<HeadlessWorkspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ChartCapturer for HeadlessCapturer {
    async fn capture(&self, widget_id: &str) -> Result<ChartSurface, CaptureError> {
        let mounted = self.workspace.mounted.lock();
        let chart = mounted
            .get(widget_id)
            .ok_or_else(|| CaptureError::NotMounted(widget_id.to_string()))?;
        let markup = chart
            .instance
            .svg()
            .ok_or_else(|| CaptureError::EmptySurface(widget_id.to_string()))?;
        Ok(ChartSurface::Svg {
            markup,
            width: chart.size.width.round() as u32,
            height: chart.size.height.round() as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use docforge_core::document::{ChartType, ChartWidgetProps, WidgetProps};
    use docforge_engine::session::EditorSession;
    use docforge_export::{ChartExportCoordinator, ExportSettings, RenderStatus};

    use super::*;

    fn demo_document() -> DocumentModel {
        let mut session = EditorSession::new();
        session.populate_demo();
        session.document().expect("demo document")
    }

    #[test]
    fn navigation_mounts_only_current_page() {
        let registry = Arc::new(ChartRenderRegistry::new());
        let workspace = HeadlessWorkspace::new(
            registry.clone(),
            demo_document(),
            NavigationCursor::default(),
        );

        workspace.navigate(&NavigationCursor::new("demo-subsection", "demo-page-1"));
        assert!(registry.is_rendered("demo-revenue"));
        assert!(!registry.is_registered("demo-trend"));

        workspace.navigate(&NavigationCursor::new("demo-subsection", "demo-page-2"));
        assert!(!registry.is_registered("demo-revenue"));
        assert!(registry.is_rendered("demo-trend"));
        assert_eq!(workspace.mounted_count(), 1);
    }

    #[test]
    fn adapter_failure_is_reported_to_registry() {
        let mut document = demo_document();
        let trend = document.find_widget_mut("demo-trend").expect("trend chart");
        trend.props = WidgetProps::Chart(ChartWidgetProps::new(ChartType::Radar));

        let registry = Arc::new(ChartRenderRegistry::new());
        let workspace =
            HeadlessWorkspace::new(registry.clone(), document, NavigationCursor::default());
        workspace.navigate(&NavigationCursor::new("demo-subsection", "demo-page-2"));

        let state = registry.get_state("demo-trend").expect("registered");
        assert_eq!(state.status, RenderStatus::Error);
        assert!(state.error.is_some());
        assert_eq!(workspace.mounted_count(), 0);
    }

    #[tokio::test]
    async fn export_fills_svg_images_and_restores_cursor() {
        let document = demo_document();
        let start = NavigationCursor::new("demo-subsection", "demo-page-1");
        let registry = Arc::new(ChartRenderRegistry::new());
        let workspace = Arc::new(HeadlessWorkspace::new(
            registry.clone(),
            document.clone(),
            start.clone(),
        ));
        let coordinator = ChartExportCoordinator::new(
            registry.clone(),
            workspace.clone(),
            Arc::new(HeadlessCapturer::new(workspace.clone())),
            ExportSettings::default(),
        )
        .with_rasterizer(None);

        let outcome = coordinator.export_charts(&document).await;

        assert_eq!(outcome.report.captured, vec!["demo-revenue", "demo-trend"]);
        for id in ["demo-revenue", "demo-trend"] {
            let image = outcome
                .document
                .find_widget(id)
                .and_then(|w| w.props.as_chart())
                .and_then(|c| c.exported_image.clone())
                .expect("exported image");
            assert!(image.starts_with("data:image/svg+xml;base64,"));
        }
        assert_eq!(workspace.current(), start);
        assert!(!registry.is_export_mode());
    }
}
