//! Web服务模块
//!
//! 提供 HTTP API 接口和文档服务

use color_eyre::Result;
use database::{DatabasePool, PgStore, Repository, Store};
use shared_lib::AppConfig;
use tokio::sync::watch::Receiver;
use tracing::{info, warn};

pub mod models;
pub mod routes;
pub mod services;

use services::{CrudService, UserService};

/// 应用共享状态
///
/// 只保存存储句柄和配置，服务实例在每个请求中通过 [`AppState::users`] 创建
#[derive(Debug, Clone)]
pub struct AppState<S: Store + Clone> {
    pub store: S,
    /// 分页查询的默认每页大小
    pub default_page_size: u64,
}

impl<S: Store + Clone> AppState<S> {
    pub fn new(store: S, default_page_size: u64) -> Self {
        Self { store, default_page_size }
    }

    /// 创建一个新的用户服务，拥有独立的存储句柄和查询作用域
    pub fn users(&self) -> UserService<S> {
        CrudService::new(Repository::new(self.store.clone()))
    }
}

/// 具体的 AppState 类型别名
pub type ConcreteAppState = AppState<PgStore>;

/// 启动 Web 服务
pub async fn start_web_service(config: &AppConfig, pool: DatabasePool, mut shutdown_rx: Receiver<bool>) -> Result<()> {
    let shared_state: ConcreteAppState = AppState::new(PgStore::new(pool), config.default_page_size);

    let router = routes::create_app_router(shared_state);

    info!("🚀 启动 Web Service 在 {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            if shutdown_rx.changed().await.is_err() {
                warn!("⚠️ 关闭信号发送端已释放");
            }
            info!("🛑 Web Service 正在关闭...");
        })
        .await?;

    Ok(())
}
