
use std::path::PathBuf;

use docforge_core::document::{LogoConfig, Orientation, WidgetProps};
use docforge_core::normalized::{denormalize, normalize};
use docforge_io::{DocumentLoader, DocumentSaver, IoError, JsonFacade, sanitize_for_export};
use golden::assert_matches_golden;

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

#[test]
fn load_quarterly_report_matches_expected_structure() {
    let loader = JsonFacade::new();
    let document = loader
        .load(&fixture("quarterly_report.json"))
        .expect("读取报告失败");
    assert_matches_golden("quarterly_report");

    assert_eq!(document.pages().count(), 2);
    assert!(document.footer.as_ref().is_some_and(|f| f.show_page_number));
    assert_eq!(document.metadata["owner"], "finance");
    assert_eq!(document.sections[0].subsections[0].pages[1].orientation, Orientation::Landscape);

    let revenue = document.find_widget("revenue").expect("未找到营收图表");
    assert_eq!(revenue.z_index, 1);
    let chart = revenue.props.as_chart().expect("应为图表");
    assert_eq!(chart.provider, "echarts");
    assert_eq!(chart.data.series[0].values, vec![120.0, 132.0, 101.0]);
}

#[test]
fn loaded_document_survives_normalization() {
    let document = JsonFacade::new()
        .load(&fixture("quarterly_report.json"))
        .expect("读取报告失败");
    assert_eq!(denormalize(&normalize(&document)), Some(document));
}

#[test]
fn save_then_load_returns_sanitized_document() {
    let mut document = JsonFacade::new()
        .load(&fixture("quarterly_report.json"))
        .expect("读取报告失败");
    document.logo = Some(LogoConfig {
        url: Some("data:image/png;base64,AAAA".to_string()),
        ..LogoConfig::default()
    });

    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = dir.path().join("export.json");
    let facade = JsonFacade::new().exported_by("tester");
    facade.save(&document, &path).expect("导出失败");

    let reloaded = facade.load(&path).expect("重新读取失败");
    assert_eq!(reloaded, sanitize_for_export(&document));
    match &reloaded.find_widget("orders").expect("未找到表格").props {
        WidgetProps::Table(table) => {
            assert!(table.rows.is_empty());
            assert_eq!(table.columns.len(), 2);
        }
        other => panic!("unexpected props {other:?}"),
    }
}

#[test]
fn missing_file_reports_read_error() {
    let err = JsonFacade::new()
        .load(&fixture("does_not_exist.json"))
        .unwrap_err();
    assert!(matches!(err, IoError::ReadError { .. }));
}
