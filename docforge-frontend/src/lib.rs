pub mod cli;
pub mod errors;
pub mod headless;
pub mod loader;

use docforge_config::AppConfig;
use errors::FrontendError;
use tracing::info;

pub use cli::{DemoOptions, DemoSummary};

/// 启动 CLI 演示或返回错误。
pub fn run_cli_demo(config: &AppConfig, options: &DemoOptions) -> Result<DemoSummary, FrontendError> {
    info!(input = ?options.input, output = ?options.output, "启动 CLI 演示前端");
    cli::run_demo(config, options)
}
