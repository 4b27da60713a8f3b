use color_eyre::eyre::Context;
use color_eyre::Result;
use database::initialize_database;
use shared_lib::AppConfig;
use tokio::sync::watch;
use tracing::{error, info};
use web_service::start_web_service;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config = AppConfig::load()?;

    tracing_subscriber::fmt().with_max_level(config.log_level).init();

    info!("🚀 启动 crud-backend...");

    let pool = initialize_database(&config).await.context("初始化数据库失败")?;

    // 收到 Ctrl+C 后通知 Web 服务优雅退出
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("❌ 监听退出信号失败: {}", e);
        }
        info!("🛑 收到退出信号");
        let _ = shutdown_tx.send(true);
    });

    start_web_service(&config, pool, shutdown_rx).await?;

    info!("👋 crud-backend 已退出");
    Ok(())
}
