//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的存储后端实现。

use super::redis_provider;
use super::PromotionStore;
use crate::config::RedisConfig;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::future::Future;
use tokio::time::{timeout, Duration};
use tracing::{debug, instrument};

/// 每次SCAN返回的建议数量
const SCAN_COUNT: usize = 1000;

/// Redis存储后端
///
/// 所有键都带有配置的前缀，清空时只删除前缀下的键，不影响同库中的其他数据
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    key_prefix: String,
    command_timeout_ms: u64,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("key_prefix", &self.key_prefix)
            .field("command_timeout_ms", &self.command_timeout_ms)
            .finish()
    }
}

impl RedisStore {
    /// 创建新的Redis存储实例
    #[instrument(skip(config), level = "info", name = "init_redis_store", fields(mode = ?config.mode))]
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let manager = redis_provider::connect(config).await?;
        Ok(Self::with_manager(
            manager,
            config.key_prefix.clone(),
            config.command_timeout_ms,
        ))
    }

    pub fn with_manager(manager: ConnectionManager, key_prefix: String, command_timeout_ms: u64) -> Self {
        Self {
            manager,
            key_prefix,
            command_timeout_ms,
        }
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    fn pattern(&self) -> String {
        format!("{}*", self.key_prefix)
    }

    async fn with_timeout<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        run_with_timeout(op, self.command_timeout_ms, fut).await
    }

    /// 遍历前缀下的所有键，`delete` 为真时逐页删除
    ///
    /// 超时按页计算：每次SCAN和每个DEL管道各自受命令超时约束。
    /// 返回遍历到的键数量
    async fn scan_keys(&self, delete: bool) -> Result<usize> {
        let mut conn = self.manager.clone();
        let pattern = self.pattern();
        let mut cursor = 0u64;
        let mut total = 0usize;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = self
                .with_timeout(
                    "SCAN",
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_COUNT)
                        .query_async(&mut conn),
                )
                .await?;

            total += keys.len();
            if delete && !keys.is_empty() {
                let mut pipe = redis::pipe();
                for key in &keys {
                    pipe.del(key).ignore();
                }
                self.with_timeout("DEL", pipe.query_async::<()>(&mut conn))
                    .await?;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(total)
    }
}

/// 在给定时间内等待一个Redis命令，超时映射为 [`CacheError::Timeout`]
async fn run_with_timeout<T, F>(op: &str, timeout_ms: u64, fut: F) -> Result<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match timeout(Duration::from_millis(timeout_ms), fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(CacheError::Timeout(format!(
            "Redis {} timed out after {}ms",
            op, timeout_ms
        ))),
    }
}

#[async_trait]
impl PromotionStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    #[instrument(skip(self), level = "debug", fields(prefix = %self.key_prefix))]
    async fn flush(&self) -> Result<()> {
        let deleted = self.scan_keys(true).await?;
        debug!("Redis flush removed {} keys", deleted);
        Ok(())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut conn = self.manager.clone();
        let key = self.key(key);
        self.with_timeout(
            "SET",
            redis::cmd("SET").arg(&key).arg(value).query_async::<()>(&mut conn),
        )
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let key = self.key(key);
        self.with_timeout(
            "GET",
            redis::cmd("GET")
                .arg(&key)
                .query_async::<Option<Vec<u8>>>(&mut conn),
        )
        .await
    }

    async fn len(&self) -> Result<usize> {
        self.scan_keys(false).await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let response = self
            .with_timeout("PING", redis::cmd("PING").query_async::<String>(&mut conn))
            .await?;
        debug!("Redis ping: {}", response);
        Ok(())
    }
}
