//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块负责根据配置建立Redis连接。

use crate::{
    config::{RedisConfig, RedisMode},
    error::{CacheError, Result},
    utils::redaction::redact_connection_string,
};
use redis::{aio::ConnectionManager, Client};
use secrecy::ExposeSecret;
use tokio::time::{timeout, Duration};

/// 根据配置构造连接URL
///
/// 单机模式下在需要时切换到 `rediss://` 并注入密码；
/// 哨兵模式下构造 `redis+sentinel://[:password@]host:port[,host:port]/master`
pub fn connection_url(config: &RedisConfig) -> Result<String> {
    match config.mode {
        RedisMode::Standalone => {
            let mut url = config.connection_string.expose_secret().to_string();
            if config.enable_tls && url.starts_with("redis://") {
                url = url.replacen("redis://", "rediss://", 1);
            }

            if let Some(password) = &config.password {
                if let Some(scheme_end) = url.find("://") {
                    if !url[scheme_end + 3..].contains('@') {
                        url.insert_str(scheme_end + 3, &format!(":{}@", password.expose_secret()));
                    }
                }
            }
            Ok(url)
        }
        RedisMode::Sentinel => {
            let sentinel = config.sentinel.as_ref().ok_or_else(|| {
                CacheError::ConfigError("Sentinel configuration is missing".to_string())
            })?;

            let nodes: Vec<&str> = sentinel
                .nodes
                .iter()
                .map(|n| {
                    n.trim_start_matches("redis://")
                        .trim_start_matches("redis+sentinel://")
                })
                .collect();
            if nodes.is_empty() {
                return Err(CacheError::ConfigError(
                    "No sentinel nodes provided".to_string(),
                ));
            }

            let mut url = "redis+sentinel://".to_string();
            if let Some(password) = &config.password {
                url.push_str(&format!(":{}@", password.expose_secret()));
            }
            url.push_str(&nodes.join(","));
            url.push('/');
            url.push_str(&sentinel.master_name);
            Ok(url)
        }
    }
}

/// 建立带自动重连的连接管理器
pub async fn connect(config: &RedisConfig) -> Result<ConnectionManager> {
    let url = connection_url(config)?;
    tracing::info!(
        "Connecting to Redis ({:?}): {}",
        config.mode,
        redact_connection_string(&url)
    );

    let client = Client::open(url.as_str())?;
    match timeout(
        Duration::from_millis(config.connection_timeout_ms),
        client.get_connection_manager(),
    )
    .await
    {
        Ok(manager) => Ok(manager?),
        Err(_) => Err(CacheError::Timeout(format!(
            "Redis connection timed out after {}ms. Target: {}",
            config.connection_timeout_ms,
            redact_connection_string(&url)
        ))),
    }
}
