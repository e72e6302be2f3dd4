//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了读取闸门，保证查询不会把重建中的空洞误报为不存在。

use super::rebuild::RebuildState;
use crate::backend::PromotionStore;
use crate::config::{ReadGateConfig, ReadMode};
use crate::error::{CacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use crate::promotion::Promotion;
use crate::serialization::{JsonSerializer, Serializer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, instrument};

/// 查询结果
#[derive(Debug, Clone)]
pub struct Lookup {
    pub promotion: Promotion,
    /// 存储中的原始JSON
    pub raw: Vec<u8>,
    /// 结果是否读取自正在重建的存储
    pub partial: bool,
}

/// 读取闸门
///
/// 阻塞模式下只在状态为 `Idle` 时读取，并在读取后确认代没有变化；
/// 尽力模式下直接读取，命中时标记 `partial`，未命中且正在重建时返回可重试错误。
#[derive(Clone)]
pub struct ReadGate {
    store: Arc<dyn PromotionStore>,
    state: watch::Receiver<RebuildState>,
    mode: ReadMode,
    wait_timeout: Duration,
    serializer: JsonSerializer,
}

impl ReadGate {
    pub fn new(
        store: Arc<dyn PromotionStore>,
        state: watch::Receiver<RebuildState>,
        config: &ReadGateConfig,
    ) -> Self {
        Self {
            store,
            state,
            mode: config.mode,
            wait_timeout: config.wait_timeout(),
            serializer: JsonSerializer::new(),
        }
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    /// 按编号查询促销记录
    ///
    /// # 错误
    ///
    /// * [`CacheError::NotFound`] - 当前完整的代中不存在该编号
    /// * [`CacheError::RebuildInProgress`] - 重建未在等待时间内结束，可稍后重试
    #[instrument(skip(self), level = "debug")]
    pub async fn lookup(&self, id: &str) -> Result<Lookup> {
        let result = match self.mode {
            ReadMode::Block => self.lookup_blocking(id).await,
            ReadMode::BestEffort => self.lookup_best_effort(id).await,
        };

        GLOBAL_METRICS.record_lookup(match &result {
            Ok(_) => "hit",
            Err(CacheError::NotFound(_)) => "not_found",
            Err(CacheError::RebuildInProgress { .. }) => "rebuild_in_progress",
            Err(_) => "error",
        });
        result
    }

    async fn lookup_blocking(&self, id: &str) -> Result<Lookup> {
        let started = Instant::now();
        let deadline = started + self.wait_timeout;
        let mut state = self.state.clone();

        loop {
            let generation = self.wait_until_idle(&mut state, deadline, started).await?;
            let raw = self.store.get(id).await?;

            let current = *state.borrow();
            if current.is_idle() && current.generation == generation {
                return match raw {
                    Some(raw) => self.decode(raw, false),
                    None => Err(CacheError::NotFound(id.to_string())),
                };
            }
            debug!(
                "Generation {} started while reading {}, waiting again",
                current.generation, id
            );
        }
    }

    async fn wait_until_idle(
        &self,
        state: &mut watch::Receiver<RebuildState>,
        deadline: Instant,
        started: Instant,
    ) -> Result<u64> {
        let waited = timeout_at(deadline, async {
            state
                .wait_for(RebuildState::is_idle)
                .await
                .map(|s| s.generation)
        })
        .await;

        match waited {
            Ok(Ok(generation)) => Ok(generation),
            Ok(Err(_)) => Err(CacheError::BackendError(
                "rebuild coordinator has shut down".to_string(),
            )),
            Err(_) => Err(CacheError::RebuildInProgress {
                waited_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }

    async fn lookup_best_effort(&self, id: &str) -> Result<Lookup> {
        let before = *self.state.borrow();
        let raw = self.store.get(id).await?;
        let after = *self.state.borrow();

        let partial = !before.is_idle() || !after.is_idle() || before.generation != after.generation;
        match raw {
            Some(raw) => self.decode(raw, partial),
            None if partial => Err(CacheError::RebuildInProgress { waited_ms: 0 }),
            None => Err(CacheError::NotFound(id.to_string())),
        }
    }

    fn decode(&self, raw: Vec<u8>, partial: bool) -> Result<Lookup> {
        let promotion = self.serializer.deserialize::<Promotion>(&raw)?;
        Ok(Lookup {
            promotion,
            raw,
            partial,
        })
    }
}
