mod runner;

use airlist_core::config::AppConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，默认 info 级别，可通过 RUST_LOG 覆盖
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 第一个参数为配置文件路径，缺省时使用内置的默认配置
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    tracing::info!(
        "⚙️ Config loaded: backend={:?}, interface={}, bind={}",
        config.backend,
        config.interface,
        config.bind_addr
    );

    runner::run(config).await
}
