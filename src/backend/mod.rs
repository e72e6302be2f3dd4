//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了促销记录的存储后端接口及其实现。

pub mod memory;
pub mod redis_provider;
pub mod redis_store;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// 促销存储特征
///
/// 重建期间会有多个工作者并发调用 `set`，实现必须支持高并发写入
#[async_trait]
pub trait PromotionStore: Send + Sync {
    /// 后端名称，用于日志和指标
    fn name(&self) -> &'static str;

    /// 清空当前代的全部记录
    async fn flush(&self) -> Result<()>;

    /// 写入一条记录
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// 读取一条记录，不存在时返回None
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 当前记录数量
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// 检查后端是否可用
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// 根据配置创建存储后端
pub async fn build_store(config: &StoreConfig) -> Result<Arc<dyn PromotionStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Redis => {
            let store = RedisStore::new(&config.redis).await?;
            info!("Redis store ready, keys scoped under prefix {:?}", store.key_prefix());
            Ok(Arc::new(store))
        }
    }
}
