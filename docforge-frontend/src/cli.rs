use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docforge_config::AppConfig;
use docforge_core::document::{DocumentModel, Metadata, WidgetProps};
use docforge_core::normalized::WidgetPatch;
use docforge_engine::session::{DemoWidgets, EditorSession};
use docforge_export::{
    ChartExportCoordinator, ChartRenderRegistry, ExportReport, ExportSettings, PdfClient,
};
use docforge_io::{DocumentSaver, JsonFacade};
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::FrontendError;
use crate::headless::{HeadlessCapturer, HeadlessWorkspace};
use crate::loader::{DocumentSource, load_session};

/// CLI 演示的输入输出选项。
#[derive(Debug, Clone, Default)]
pub struct DemoOptions {
    pub input: Option<PathBuf>,
    /// 导出 JSON 的目标路径。
    pub output: Option<PathBuf>,
    /// 生成 PDF 的目标路径，需要配置可用的 PDF 服务。
    pub pdf: Option<PathBuf>,
}

/// 演示结束后的摘要，供调用方或测试检查。
#[derive(Debug)]
pub struct DemoSummary {
    pub document: DocumentModel,
    pub report: ExportReport,
    pub undo_len: usize,
}

/// 简易 CLI 演示：加载文档，演练编辑与撤销，再以无界面方式导出图表。
pub fn run_demo(config: &AppConfig, options: &DemoOptions) -> Result<DemoSummary, FrontendError> {
    let loaded = load_session(options.input.as_deref(), config);
    let mut session = loaded.session;

    println!("Rust 版 docforge CLI 演示");
    match &loaded.source {
        DocumentSource::Json(path) => println!("已从 JSON 加载文档：{}", path.display()),
        DocumentSource::Demo => println!("已构建内置示例报告"),
    }

    if let Some(ids) = &loaded.demo_widgets {
        exercise_history(&mut session, ids)?;
    }

    let document = session.document().ok_or(FrontendError::DocumentNotLoaded)?;
    print_outline(&document);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(FrontendError::Runtime)?;
    let (document, report) = runtime.block_on(async {
        let outcome = export_headless(config, &session, &document).await;
        if let Some(path) = &options.output {
            JsonFacade::new()
                .exported_by("docforge-cli")
                .app_version(env!("CARGO_PKG_VERSION"))
                .save(&outcome.0, path)?;
            println!("已导出 JSON：{}", path.display());
        }
        if let Some(path) = &options.pdf {
            generate_pdf(config, &outcome.0, path).await?;
        }
        Ok::<_, FrontendError>(outcome)
    })?;

    print_report(&report);
    Ok(DemoSummary {
        document,
        report,
        undo_len: session.history().undo_len(),
    })
}

/// 在示例文档上演练连续修改合并、删除撤销以及复制粘贴。
fn exercise_history(session: &mut EditorSession, ids: &DemoWidgets) -> Result<(), FrontendError> {
    for content in ["季度经营报告（草稿）", "季度经营报告（终稿）"] {
        let mut patch = Metadata::new();
        patch.insert("content".to_string(), Value::from(content));
        session.update_widget(&ids.headline, WidgetPatch::props(patch))?;
    }
    println!(
        "[历史] 连续修改标题后撤销栈长度 = {}",
        session.history().undo_len()
    );

    session.delete_widget(&ids.trend_chart)?;
    session.undo();
    println!(
        "[历史] 删除并撤销趋势图后，趋势图{}",
        if session.store().state().widget(&ids.trend_chart).is_some() {
            "已恢复"
        } else {
            "丢失"
        }
    );

    session.clear_selection();
    session.select(&ids.revenue_chart)?;
    session.copy_selection();
    let pasted = session.paste("demo-page-2")?;
    println!("[历史] 已粘贴控件：{}", pasted.join(", "));
    session.undo();
    println!(
        "[历史] 撤销粘贴，可重做 {} 步",
        session.history().redo_len()
    );

    session.set_zoom(1.5);
    session.undo_zoom();
    println!("[视图] 缩放撤销后 = {:.2}", session.viewport().zoom);
    Ok(())
}

async fn export_headless(
    config: &AppConfig,
    session: &EditorSession,
    document: &DocumentModel,
) -> (DocumentModel, ExportReport) {
    let registry = Arc::new(ChartRenderRegistry::new());
    let workspace = Arc::new(HeadlessWorkspace::new(
        registry.clone(),
        document.clone(),
        session.cursor().clone(),
    ));
    let coordinator = ChartExportCoordinator::new(
        registry,
        workspace.clone(),
        Arc::new(HeadlessCapturer::new(workspace)),
        export_settings(config),
    );
    let outcome = coordinator.export_charts(document).await;
    info!(
        charts = outcome.report.charts,
        captured = outcome.report.captured.len(),
        "无界面图表导出完成"
    );
    (outcome.document, outcome.report)
}

fn export_settings(config: &AppConfig) -> ExportSettings {
    ExportSettings {
        registration_timeout: config.export.registration_timeout(),
        render_timeout: config.export.render_timeout(),
        capture_concurrency: config.export.capture_concurrency,
        cache_capacity: config.export.cache_capacity,
    }
}

async fn generate_pdf(
    config: &AppConfig,
    document: &DocumentModel,
    path: &Path,
) -> Result<(), FrontendError> {
    if config.pdf.endpoint.is_empty() {
        warn!("未配置 PDF 服务地址，跳过 PDF 生成");
        return Ok(());
    }
    let client = PdfClient::new(config.pdf.endpoint.as_str(), config.pdf.timeout())?;
    let pdf = client.generate(document).await?;
    fs::write(path, pdf).map_err(|source| FrontendError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    println!("已生成 PDF：{}", path.display());
    Ok(())
}

fn print_outline(document: &DocumentModel) {
    println!("文档《{}》(id={})", document.title, document.id);
    for section in &document.sections {
        println!("  章节 {} - {}", section.id, section.title);
        for subsection in &section.subsections {
            println!("    子章节 {} - {}", subsection.id, subsection.title);
            for page in &subsection.pages {
                println!("      第 {} 页 ({}), 控件 {} 个", page.number, page.id, page.widgets.len());
                for widget in &page.widgets {
                    println!(
                        "        - {} [{}] 位置=({:.0}, {:.0}) 尺寸={:.0}x{:.0}{}",
                        widget.id,
                        widget.kind().as_str(),
                        widget.position.x,
                        widget.position.y,
                        widget.size.width,
                        widget.size.height,
                        describe_props(&widget.props)
                    );
                }
            }
        }
    }
}

fn describe_props(props: &WidgetProps) -> String {
    match props {
        WidgetProps::Chart(chart) => format!(
            ", 图表={:?}, 系列数={}",
            chart.chart_type,
            chart.data.series.len()
        ),
        WidgetProps::Table(table) => format!(", 列数={}, 行数={}", table.columns.len(), table.rows.len()),
        WidgetProps::Text(text) => format!(", 文本长度={}", text.content.chars().count()),
        _ => String::new(),
    }
}

fn print_report(report: &ExportReport) {
    println!(
        "图表导出：共 {} 个，新截图 {} 个，缓存命中 {} 个",
        report.charts,
        report.captured.len(),
        report.cache_hits.len()
    );
    for (label, ids) in [
        ("截图失败", &report.failed),
        ("未登记", &report.unregistered),
        ("绘制超时", &report.timed_out),
        ("绘制出错", &report.render_errors),
    ] {
        if !ids.is_empty() {
            println!("  {label}: {}", ids.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_run_exports_charts_and_writes_json() {
        let dir = tempfile::tempdir().expect("temp dir");
        let output = dir.path().join("demo.json");
        let options = DemoOptions {
            output: Some(output.clone()),
            ..DemoOptions::default()
        };

        let summary = run_demo(&AppConfig::default(), &options).expect("demo run");

        assert_eq!(summary.report.charts, 2);
        assert!(summary.report.is_complete());
        // 合并后的标题修改 + 删除(已撤销) + 粘贴(已撤销)
        assert_eq!(summary.undo_len, 1);
        assert!(output.exists());
        let headline = summary.document.find_widget("demo-headline").expect("headline");
        match &headline.props {
            WidgetProps::Text(text) => assert_eq!(text.content, "季度经营报告（终稿）"),
            other => panic!("unexpected props {other:?}"),
        }
    }
}
