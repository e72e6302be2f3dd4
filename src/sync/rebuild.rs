//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了重建协调器：清空存储、流式读取快照、分发给工作池并等待汇合。

use super::worker_pool::{join_workers, WorkerPool};
use crate::backend::PromotionStore;
use crate::config::{Config, PoolConfig};
use crate::error::{CacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::JsonSerializer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, instrument, warn};

/// 重建阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildPhase {
    Idle,
    Flushing,
    Streaming,
    Draining,
}

/// 协调器对外发布的重建状态
///
/// `generation` 在每次成功触发时递增，读取方据此判断读取期间是否有重建开始
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebuildState {
    pub phase: RebuildPhase,
    pub generation: u64,
}

impl RebuildState {
    pub fn is_idle(&self) -> bool {
        self.phase == RebuildPhase::Idle
    }
}

impl Default for RebuildState {
    fn default() -> Self {
        Self {
            phase: RebuildPhase::Idle,
            generation: 0,
        }
    }
}

/// 单次重建周期的结果
#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub generation: u64,
    /// 生产者从快照读出的行数
    pub lines_read: u64,
    pub stored: u64,
    pub parse_failures: u64,
    pub serialize_failures: u64,
    pub write_failures: u64,
    pub worker_panics: usize,
    /// 读取中断的原因，`None` 表示完整读完了快照
    pub interrupted: Option<String>,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl RebuildReport {
    /// 快照是否被完整读取
    pub fn is_complete(&self) -> bool {
        self.interrupted.is_none()
    }
}

/// 重建状态快照，供状态接口展示
#[derive(Debug, Clone, Serialize)]
pub struct RebuildStatus {
    pub state: RebuildState,
    /// 当前周期已处理的行数
    pub progress: u64,
    pub last_report: Option<RebuildReport>,
}

/// 重建意图
///
/// 持有期间状态不为 `Idle`；无论周期如何结束（包括 panic），drop 时都会回到 `Idle`
struct RebuildIntent {
    state: Arc<watch::Sender<RebuildState>>,
    generation: u64,
}

impl RebuildIntent {
    fn advance(&self, phase: RebuildPhase) {
        debug!("Rebuild generation {} -> {:?}", self.generation, phase);
        self.state.send_modify(|s| s.phase = phase);
    }
}

impl Drop for RebuildIntent {
    fn drop(&mut self) {
        self.state.send_modify(|s| s.phase = RebuildPhase::Idle);
    }
}

#[derive(Debug, Default)]
struct ProducerOutcome {
    lines_read: u64,
    /// 不是合法UTF-8、未进入行队列的行数
    encoding_failures: u64,
    interrupted: Option<String>,
}

/// 重建协调器
///
/// 同一时刻最多只有一个周期处于 `Flushing`/`Streaming`/`Draining`。
/// 互斥通过状态的比较并设置实现，整个周期内不持有任何锁。
pub struct RebuildCoordinator {
    store: Arc<dyn PromotionStore>,
    source_path: PathBuf,
    pool_size: usize,
    channel_capacity: usize,
    serializer: JsonSerializer,
    state: Arc<watch::Sender<RebuildState>>,
    progress: Arc<AtomicU64>,
    last_report: RwLock<Option<RebuildReport>>,
}

impl RebuildCoordinator {
    /// 创建新的重建协调器
    ///
    /// # 参数
    ///
    /// * `store` - 促销存储
    /// * `source_path` - 快照文件路径
    /// * `pool` - 工作池配置
    pub fn new(store: Arc<dyn PromotionStore>, source_path: impl Into<PathBuf>, pool: &PoolConfig) -> Self {
        let (state, _) = watch::channel(RebuildState::default());
        Self {
            store,
            source_path: source_path.into(),
            pool_size: pool.workers.max(1),
            channel_capacity: pool.effective_channel_capacity(),
            serializer: JsonSerializer::new(),
            state: Arc::new(state),
            progress: Arc::new(AtomicU64::new(0)),
            last_report: RwLock::new(None),
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn PromotionStore>) -> Self {
        Self::new(store, config.source.path.clone(), &config.pool)
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn store(&self) -> &Arc<dyn PromotionStore> {
        &self.store
    }

    /// 订阅重建状态变化
    pub fn subscribe(&self) -> watch::Receiver<RebuildState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> RebuildState {
        *self.state.borrow()
    }

    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }

    pub async fn last_report(&self) -> Option<RebuildReport> {
        self.last_report.read().await.clone()
    }

    pub async fn status(&self) -> RebuildStatus {
        RebuildStatus {
            state: self.state(),
            progress: self.progress(),
            last_report: self.last_report().await,
        }
    }

    /// 执行一次完整的重建周期
    ///
    /// 已有周期在运行时返回 [`CacheError::RebuildAlreadyInProgress`]，且不触碰存储
    #[instrument(skip(self), level = "info", fields(source = %self.source_path.display()))]
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let intent = self.claim()?;
        self.flush(&intent).await?;
        let file = self.open_source().await?;
        self.stream(intent, BufReader::new(file)).await
    }

    /// 从任意有序行来源执行一次重建周期
    pub async fn rebuild_from_reader<R>(&self, reader: R) -> Result<RebuildReport>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let intent = self.claim()?;
        self.flush(&intent).await?;
        self.stream(intent, reader).await
    }

    /// 手动触发重建，在后台任务中运行
    ///
    /// 重建意图在返回前同步获取，因此返回 `Ok` 时状态已不是 `Idle`
    pub fn spawn_rebuild(self: &Arc<Self>) -> Result<u64> {
        let intent = self.claim()?;
        let generation = intent.generation;
        let coordinator = Arc::clone(self);

        tokio::spawn(async move {
            let result = async {
                coordinator.flush(&intent).await?;
                let file = coordinator.open_source().await?;
                coordinator.stream(intent, BufReader::new(file)).await
            }
            .await;

            if let Err(e) = result {
                error!("Manual rebuild of generation {} failed: {}", generation, e);
            }
        });

        Ok(generation)
    }

    fn claim(&self) -> Result<RebuildIntent> {
        let mut claimed = None;
        self.state.send_if_modified(|state| {
            if state.is_idle() {
                state.generation += 1;
                state.phase = RebuildPhase::Flushing;
                claimed = Some(state.generation);
                true
            } else {
                false
            }
        });

        match claimed {
            Some(generation) => {
                self.progress.store(0, Ordering::Relaxed);
                Ok(RebuildIntent {
                    state: self.state.clone(),
                    generation,
                })
            }
            None => {
                let current = self.state();
                warn!(
                    "Rebuild trigger rejected, generation {} is still {:?}",
                    current.generation, current.phase
                );
                GLOBAL_METRICS.record_rebuild("rejected");
                Err(CacheError::RebuildAlreadyInProgress {
                    generation: current.generation,
                })
            }
        }
    }

    async fn flush(&self, intent: &RebuildIntent) -> Result<()> {
        info!(
            "Synchronizing {} store with the snapshot, generation {}",
            self.store.name(),
            intent.generation
        );
        if let Err(e) = self.store.flush().await {
            error!("Can't flush the store, rebuild aborted: {}", e);
            GLOBAL_METRICS.record_rebuild("flush_failed");
            return Err(e);
        }
        debug!("Store is flushed.");
        Ok(())
    }

    async fn open_source(&self) -> Result<File> {
        File::open(&self.source_path).await.map_err(|source| {
            error!(
                "Can't open the snapshot {}: {}. Store is left empty until the next cycle",
                self.source_path.display(),
                source
            );
            GLOBAL_METRICS.record_rebuild("source_unavailable");
            CacheError::SourceUnavailable {
                path: self.source_path.clone(),
                source,
            }
        })
    }

    async fn stream<R>(&self, intent: RebuildIntent, reader: R) -> Result<RebuildReport>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let started = Instant::now();
        intent.advance(RebuildPhase::Streaming);

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let pool = WorkerPool::new(
            self.pool_size,
            self.store.clone(),
            self.serializer,
            self.progress.clone(),
        );
        let workers = pool.spawn(rx);

        // 生产者独占唯一的发送端，结束即关闭行队列
        let produced = match tokio::spawn(produce_lines(reader, tx)).await {
            Ok(outcome) => outcome,
            Err(e) => ProducerOutcome {
                interrupted: Some(format!("line producer failed: {}", e)),
                ..ProducerOutcome::default()
            },
        };

        intent.advance(RebuildPhase::Draining);
        let pipeline = join_workers(workers).await;

        GLOBAL_METRICS.record_lines("parse_failed", produced.encoding_failures);

        let report = RebuildReport {
            generation: intent.generation,
            lines_read: produced.lines_read,
            stored: pipeline.totals.stored,
            parse_failures: pipeline.totals.parse_failures + produced.encoding_failures,
            serialize_failures: pipeline.totals.serialize_failures,
            write_failures: pipeline.totals.write_failures,
            worker_panics: pipeline.worker_panics,
            interrupted: produced.interrupted,
            duration_ms: started.elapsed().as_millis() as u64,
            finished_at: Utc::now(),
        };

        if report.is_complete() {
            info!(
                "Store has been synchronized with the snapshot: generation={}, stored={}, parse_failures={}, write_failures={}, {}ms",
                report.generation, report.stored, report.parse_failures, report.write_failures, report.duration_ms
            );
            GLOBAL_METRICS.record_rebuild("completed");
        } else {
            warn!(
                "Partial generation {} stored {} of {} lines read: {}",
                report.generation,
                report.stored,
                report.lines_read,
                report.interrupted.as_deref().unwrap_or_default()
            );
            GLOBAL_METRICS.record_rebuild("interrupted");
        }
        GLOBAL_METRICS.record_rebuild_duration(started.elapsed().as_secs_f64(), report.stored);

        *self.last_report.write().await = Some(report.clone());
        drop(intent);
        Ok(report)
    }
}

/// 单一生产者：按顺序读取快照并推入行队列
///
/// 按字节读取每一行，不是合法UTF-8的行记为解析失败后跳过。
/// 只有I/O错误会结束生产，已入队的行仍会被工作者处理完
async fn produce_lines<R>(mut reader: R, lines: mpsc::Sender<String>) -> ProducerOutcome
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let mut outcome = ProducerOutcome::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                outcome.lines_read += 1;
                let line = match std::str::from_utf8(strip_line_ending(&buf)) {
                    Ok(line) => line.to_string(),
                    Err(e) => {
                        warn!(line = outcome.lines_read, error = %e, "Line is not valid UTF-8, line dropped");
                        outcome.encoding_failures += 1;
                        continue;
                    }
                };
                if lines.send(line).await.is_err() {
                    warn!("All workers stopped before the snapshot was fully read");
                    outcome.interrupted = Some("all workers stopped".to_string());
                    break;
                }
            }
            Err(e) => {
                warn!(
                    "Snapshot reading has been interrupted after {} lines: {}",
                    outcome.lines_read, e
                );
                outcome.interrupted = Some(e.to_string());
                break;
            }
        }
    }

    outcome
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
