use airlist_core::{
    config::AppConfig,
    context::WifiContext,
    factory::create_platform,
    orchestrator::ConnectPhase,
    reactor::ConnectionState,
    web_server,
};
use tokio::sync::watch;
use tracing::{info, warn};

// 启动上下文与 Web 服务器，直到收到 Ctrl-C 或服务器退出
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let platform = create_platform(&config).await?;
    let ctx = WifiContext::start(platform, config.context_options()).await?;
    info!("📡 Runner: context started with {:?} tier", ctx.tier());

    let logger = tokio::spawn(log_transitions(ctx.subscribe()));
    let server = web_server::start_web_server(config.bind_addr, ctx.commands(), ctx.subscribe());

    let outcome = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            info!("🛑 Ctrl-C received, shutting down");
            res.map_err(anyhow::Error::from)
        }
        res = server => match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::Error::from(e)),
            Err(e) => Err(anyhow::Error::from(e)),
        },
    };

    ctx.shutdown().await?;
    logger.abort();
    outcome
}

/// Logs phase changes and connection changes as snapshots arrive.
async fn log_transitions(mut rx: watch::Receiver<ConnectionState>) {
    let mut last = rx.borrow_and_update().clone();
    while rx.changed().await.is_ok() {
        let next = rx.borrow_and_update().clone();
        if next.phase != last.phase {
            match &next.phase {
                ConnectPhase::AwaitingCredential { ssid } => {
                    info!("🔑 '{}' needs a password (POST /api/credential)", ssid)
                }
                ConnectPhase::Failed { ssid, reason } => {
                    warn!("❌ Connection to '{}' failed: {}", ssid, reason)
                }
                phase => info!("🔁 Phase: {:?}", phase),
            }
        }
        if next.current_connection != last.current_connection {
            match &next.current_connection {
                Some(current) => info!("✅ Connected to '{}'", current.ssid),
                None => info!("📴 Not connected"),
            }
        }
        last = next;
    }
}
