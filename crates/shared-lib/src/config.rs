//! 程序配置
//!
//! 所有配置都从环境变量读取，本地开发时可以放在 `.env` 文件中。

use color_eyre::eyre::Context;
use color_eyre::{Help, Result};
use std::str::FromStr;
use std::sync::Arc;
use tracing::Level;

/// 默认监听地址
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// 分页查询默认的每页大小
pub const DEFAULT_PAGE_SIZE: u64 = 15;

/// 程序配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// postgresql数据库链接字符串
    pub postgresql_conn_str: String,

    /// Web服务监听地址
    ///
    /// 可通过环境变量 `BIND_ADDR` 来调整
    pub bind_addr: String,

    /// 分页查询的默认每页大小，请求参数 `page_size` 可以覆盖它
    ///
    /// 可通过环境变量 `DEFAULT_PAGE_SIZE` 来调整
    pub default_page_size: u64,

    /// 数据库连接池最大连接数，生产环境配置30~40即可
    ///
    /// 可通过环境变量 `DB_MAX_CONNECTIONS` 来调整
    pub max_connections: u32,

    /// 日志级别，可通过环境变量 `LOG_LEVEL` 来调整
    pub log_level: Level,
}

impl AppConfig {
    pub fn load() -> Result<Arc<AppConfig>> {
        // 加载.env文件中的数据注入到环境变量中，方便本地测试
        // 线上环境部署时会直接使用环境变量，不需要.env文件
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("未加载 .env 文件: {e}");
        }

        // 读取数据库地址信息（仅支持postgresql）
        let db_url = std::env::var("DATABASE_URL")
            .context("Can not load DATABASE_URL in environment")
            .suggestion("设置 DATABASE_URL 环境变量")?;

        let config = AppConfig {
            postgresql_conn_str: db_url,
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            default_page_size: env_or("DEFAULT_PAGE_SIZE", DEFAULT_PAGE_SIZE),
            max_connections: env_or("DB_MAX_CONNECTIONS", 40),
            log_level: env_or("LOG_LEVEL", Level::DEBUG),
        };
        Ok(Arc::new(config))
    }
}

/// 读取并解析环境变量，不存在或者解析失败时使用默认值
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key).ok().map(|s| s.parse()) {
        Some(Ok(value)) => value,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_falls_back_on_missing_or_invalid() {
        assert_eq!(env_or("CRUD_BACKEND_SURELY_MISSING_KEY", 15u64), 15);

        std::env::set_var("CRUD_BACKEND_TEST_PAGE_SIZE", "not-a-number");
        assert_eq!(env_or("CRUD_BACKEND_TEST_PAGE_SIZE", 15u64), 15);

        std::env::set_var("CRUD_BACKEND_TEST_PAGE_SIZE", "50");
        assert_eq!(env_or("CRUD_BACKEND_TEST_PAGE_SIZE", 15u64), 50);
    }

    #[test]
    fn test_env_or_parses_log_level() {
        std::env::set_var("CRUD_BACKEND_TEST_LOG_LEVEL", "warn");
        assert_eq!(env_or("CRUD_BACKEND_TEST_LOG_LEVEL", Level::DEBUG), Level::WARN);
    }
}
