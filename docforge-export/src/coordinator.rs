use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use docforge_core::document::{DocumentModel, WidgetModel};
use docforge_core::navigation::NavigationCursor;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{DEFAULT_CACHE_CAPACITY, ExportImageCache, signature};
use crate::capture::{ChartCapturer, SvgRasterizer, to_data_url};
use crate::registry::{ChartRenderRegistry, RenderStatus};

pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_CAPTURE_CONCURRENCY: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct ExportSettings {
    /// 等待页面图表完成登记的上限，超时后继续导出。
    pub registration_timeout: Duration,
    /// 等待页面图表绘制完成的上限。
    pub render_timeout: Duration,
    pub capture_concurrency: usize,
    pub cache_capacity: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            registration_timeout: DEFAULT_REGISTRATION_TIMEOUT,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            capture_concurrency: DEFAULT_CAPTURE_CONCURRENCY,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// 编辑器的页面导航。同一时刻只有当前页面的控件处于挂载状态。
pub trait EditorNavigator: Send + Sync {
    fn current(&self) -> NavigationCursor;

    /// 切换到指定页面。图表挂载与绘制是异步的，通过渲染登记表报告进度。
    fn navigate(&self, cursor: &NavigationCursor);
}

/// 图表控件在嵌套文档中的位置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartLocation {
    pub widget_id: String,
    pub section_id: String,
    pub subsection_id: String,
    pub page_id: String,
    section_index: usize,
    subsection_index: usize,
    page_index: usize,
    widget_index: usize,
}

impl ChartLocation {
    fn widget<'a>(&self, document: &'a DocumentModel) -> Option<&'a WidgetModel> {
        document
            .sections
            .get(self.section_index)?
            .subsections
            .get(self.subsection_index)?
            .pages
            .get(self.page_index)?
            .widgets
            .get(self.widget_index)
    }

    fn widget_mut<'a>(&self, document: &'a mut DocumentModel) -> Option<&'a mut WidgetModel> {
        document
            .sections
            .get_mut(self.section_index)?
            .subsections
            .get_mut(self.subsection_index)?
            .pages
            .get_mut(self.page_index)?
            .widgets
            .get_mut(self.widget_index)
    }
}

/// 按文档顺序收集全部图表控件。
pub fn collect_chart_locations(document: &DocumentModel) -> Vec<ChartLocation> {
    let mut locations = Vec::new();
    for (section_index, section) in document.sections.iter().enumerate() {
        for (subsection_index, subsection) in section.subsections.iter().enumerate() {
            for (page_index, page) in subsection.pages.iter().enumerate() {
                for (widget_index, widget) in page.widgets.iter().enumerate() {
                    if widget.is_chart() {
                        locations.push(ChartLocation {
                            widget_id: widget.id.clone(),
                            section_id: section.id.clone(),
                            subsection_id: subsection.id.clone(),
                            page_id: page.id.clone(),
                            section_index,
                            subsection_index,
                            page_index,
                            widget_index,
                        });
                    }
                }
            }
        }
    }
    locations
}

/// 按子章节分组，组的顺序与组内顺序都保持文档顺序。
pub fn group_by_subsection(locations: &[ChartLocation]) -> Vec<(String, Vec<ChartLocation>)> {
    group_by(locations, |location| &location.subsection_id)
}

pub fn group_by_page(locations: &[ChartLocation]) -> Vec<(String, Vec<ChartLocation>)> {
    group_by(locations, |location| &location.page_id)
}

fn group_by(
    locations: &[ChartLocation],
    key: impl Fn(&ChartLocation) -> &String,
) -> Vec<(String, Vec<ChartLocation>)> {
    let mut groups: Vec<(String, Vec<ChartLocation>)> = Vec::new();
    for location in locations {
        let id = key(location);
        match groups.iter_mut().find(|(group, _)| group == id) {
            Some((_, members)) => members.push(location.clone()),
            None => groups.push((id.clone(), vec![location.clone()])),
        }
    }
    groups
}

/// 一次导出的结果统计。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub charts: usize,
    pub captured: Vec<String>,
    pub cache_hits: Vec<String>,
    pub failed: Vec<String>,
    pub unregistered: Vec<String>,
    pub timed_out: Vec<String>,
    pub render_errors: Vec<String>,
}

impl ExportReport {
    /// 每个图表都得到了导出图像。
    pub fn is_complete(&self) -> bool {
        self.captured.len() + self.cache_hits.len() == self.charts
    }
}

#[derive(Debug, Clone)]
pub struct ChartExportOutcome {
    pub document: DocumentModel,
    pub report: ExportReport,
}

struct CaptureTarget {
    location: ChartLocation,
    signature: String,
}

enum CaptureOutcome {
    Cached(String),
    Captured(String),
    Failed,
}

/// 批量导出图表图像。
///
/// 页面之间严格按顺序导航，同一页面内的截图以有限并发进行。
/// 导出模式与编辑器原有的导航位置在任何退出路径上都会恢复。
pub struct ChartExportCoordinator {
    registry: Arc<ChartRenderRegistry>,
    navigator: Arc<dyn EditorNavigator>,
    capturer: Arc<dyn ChartCapturer>,
    rasterizer: Option<Arc<dyn SvgRasterizer>>,
    cache: Mutex<ExportImageCache>,
    settings: ExportSettings,
}

impl ChartExportCoordinator {
    pub fn new(
        registry: Arc<ChartRenderRegistry>,
        navigator: Arc<dyn EditorNavigator>,
        capturer: Arc<dyn ChartCapturer>,
        settings: ExportSettings,
    ) -> Self {
        Self {
            registry,
            navigator,
            capturer,
            rasterizer: default_rasterizer(),
            cache: Mutex::new(ExportImageCache::new(settings.cache_capacity)),
            settings,
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Option<Arc<dyn SvgRasterizer>>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    #[inline]
    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn cached_images(&self) -> usize {
        self.cache.lock().len()
    }

    /// 导出文档中全部图表的图像，返回写入了 `exportedImage` 的文档副本。
    ///
    /// 传入的文档不会被修改。单个图表的失败只记入报告，不会中断导出。
    pub async fn export_charts(&self, document: &DocumentModel) -> ChartExportOutcome {
        let mut output = document.clone();
        let locations = collect_chart_locations(&output);
        let mut report = ExportReport {
            charts: locations.len(),
            ..ExportReport::default()
        };
        if locations.is_empty() {
            debug!(document_id = %document.id, "文档中没有图表，跳过导出");
            return ChartExportOutcome {
                document: output,
                report,
            };
        }

        info!(document_id = %document.id, charts = locations.len(), "开始导出图表");
        self.registry.enter_export_mode();
        let original = self.navigator.current();
        let _restore = scopeguard::guard(original, |original| {
            self.registry.exit_export_mode();
            self.navigator.navigate(&original);
            debug!(
                subsection_id = ?original.subsection_id,
                page_id = ?original.page_id,
                "已恢复导出前的页面"
            );
        });

        for (subsection_id, charts) in group_by_subsection(&locations) {
            for (page_id, page_charts) in group_by_page(&charts) {
                self.export_page(&mut output, &subsection_id, &page_id, &page_charts, &mut report)
                    .await;
            }
        }

        info!(
            captured = report.captured.len(),
            cache_hits = report.cache_hits.len(),
            failed = report.failed.len(),
            unregistered = report.unregistered.len(),
            timed_out = report.timed_out.len(),
            "图表导出完成"
        );
        ChartExportOutcome {
            document: output,
            report,
        }
    }

    async fn export_page(
        &self,
        output: &mut DocumentModel,
        subsection_id: &str,
        page_id: &str,
        charts: &[ChartLocation],
        report: &mut ExportReport,
    ) {
        self.navigator
            .navigate(&NavigationCursor::new(subsection_id, page_id));

        let ids: Vec<&str> = charts.iter().map(|c| c.widget_id.as_str()).collect();
        let missing = self
            .registry
            .wait_for_registration(&ids, self.settings.registration_timeout)
            .await;
        if !missing.is_empty() {
            warn!(page_id, missing = ?missing, "部分图表在超时前未登记，继续导出");
        }
        let registered: Vec<&ChartLocation> = charts
            .iter()
            .filter(|c| !missing.contains(&c.widget_id))
            .collect();
        report.unregistered.extend(missing);

        let registered_ids: Vec<&str> = registered.iter().map(|c| c.widget_id.as_str()).collect();
        if tokio::time::timeout(
            self.settings.render_timeout,
            self.registry.wait_for_charts(&registered_ids),
        )
        .await
        .is_err()
        {
            warn!(page_id, "等待图表绘制超时，继续导出已完成的图表");
        }

        let mut targets = Vec::new();
        for location in registered {
            let status = self
                .registry
                .get_state(&location.widget_id)
                .map(|state| state.status);
            match status {
                Some(RenderStatus::Rendered) => {
                    let Some(widget) = location.widget(output) else {
                        continue;
                    };
                    targets.push(CaptureTarget {
                        location: location.clone(),
                        signature: signature(widget),
                    });
                }
                Some(RenderStatus::Error) => {
                    warn!(widget_id = %location.widget_id, "图表绘制失败，跳过截图");
                    report.render_errors.push(location.widget_id.clone());
                }
                _ => report.timed_out.push(location.widget_id.clone()),
            }
        }

        let outcomes = self.capture_all(&targets).await;
        for (target, outcome) in targets.iter().zip(outcomes) {
            let widget_id = target.location.widget_id.clone();
            let image = match outcome {
                CaptureOutcome::Cached(image) => {
                    report.cache_hits.push(widget_id);
                    image
                }
                CaptureOutcome::Captured(image) => {
                    report.captured.push(widget_id);
                    image
                }
                CaptureOutcome::Failed => {
                    report.failed.push(widget_id);
                    continue;
                }
            };
            if let Some(chart) = target
                .location
                .widget_mut(output)
                .and_then(|widget| widget.props.as_chart_mut())
            {
                chart.exported_image = Some(image);
            }
        }
    }

    /// 固定数量的工作者依次领取下一个目标，直到全部处理完毕。结果按目标顺序返回。
    async fn capture_all(&self, targets: &[CaptureTarget]) -> Vec<CaptureOutcome> {
        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<CaptureOutcome>>> =
            Mutex::new(targets.iter().map(|_| None).collect());

        let (next_index, results) = (&next, &slots);
        let worker = || async move {
            loop {
                let index = next_index.fetch_add(1, Ordering::SeqCst);
                let Some(target) = targets.get(index) else {
                    break;
                };
                let outcome = self.capture_one(target).await;
                results.lock()[index] = Some(outcome);
            }
        };
        let workers = self.settings.capture_concurrency.max(1).min(targets.len());
        join_all((0..workers).map(|_| worker())).await;

        slots
            .into_inner()
            .into_iter()
            .map(|slot| slot.unwrap_or(CaptureOutcome::Failed))
            .collect()
    }

    async fn capture_one(&self, target: &CaptureTarget) -> CaptureOutcome {
        let widget_id = target.location.widget_id.as_str();
        let cached = self.cache.lock().get(&target.signature);
        if let Some(image) = cached {
            debug!(widget_id, "命中导出图像缓存");
            return CaptureOutcome::Cached(image);
        }

        match self.capturer.capture(widget_id).await {
            Ok(surface) => {
                let image = to_data_url(surface, self.rasterizer.as_deref());
                self.cache
                    .lock()
                    .insert(target.signature.clone(), image.clone());
                CaptureOutcome::Captured(image)
            }
            Err(err) => {
                warn!(widget_id, error = %err, "图表截图失败");
                CaptureOutcome::Failed
            }
        }
    }
}

#[cfg(feature = "raster")]
fn default_rasterizer() -> Option<Arc<dyn SvgRasterizer>> {
    Some(Arc::new(crate::capture::ResvgRasterizer))
}

#[cfg(not(feature = "raster"))]
fn default_rasterizer() -> Option<Arc<dyn SvgRasterizer>> {
    None
}
