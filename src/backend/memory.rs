//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于内存的存储后端。

use super::PromotionStore;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, instrument};

/// 内存存储后端
///
/// 单进程部署和测试使用，分片锁保证并发写入互不阻塞
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前所有键（已排序）
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl PromotionStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    #[instrument(skip(self), level = "debug")]
    async fn flush(&self) -> Result<()> {
        debug!("Memory flush: 清空 {} 个条目", self.entries.len());
        self.entries.clear();
        Ok(())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.len())
    }
}
