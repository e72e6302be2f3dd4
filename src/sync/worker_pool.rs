//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了解析并写入促销记录的工作池，以及等待所有工作者结束的汇合逻辑。

use crate::backend::PromotionStore;
use crate::metrics::GLOBAL_METRICS;
use crate::promotion::parse_line;
use crate::serialization::{JsonSerializer, Serializer};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// 单个工作者的处理统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    /// 从行队列中取出的行数
    pub processed: u64,
    /// 成功写入存储的记录数
    pub stored: u64,
    pub parse_failures: u64,
    pub serialize_failures: u64,
    pub write_failures: u64,
}

impl WorkerReport {
    pub fn merge(&mut self, other: &WorkerReport) {
        self.processed += other.processed;
        self.stored += other.stored;
        self.parse_failures += other.parse_failures;
        self.serialize_failures += other.serialize_failures;
        self.write_failures += other.write_failures;
    }
}

/// 所有工作者汇合后的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    /// 正常结束的工作者数量
    pub workers_joined: usize,
    /// 异常终止的工作者数量
    pub worker_panics: usize,
    pub totals: WorkerReport,
}

/// 工作池
///
/// 固定数量的工作者共享同一个行队列。工作者无状态且可互换，
/// 池大小只影响吞吐量和并发连接数，不影响结果。
pub struct WorkerPool {
    size: usize,
    store: Arc<dyn PromotionStore>,
    serializer: JsonSerializer,
    progress: Arc<AtomicU64>,
}

impl WorkerPool {
    /// 创建新的工作池
    ///
    /// # 参数
    ///
    /// * `size` - 工作者数量，至少为1
    /// * `store` - 写入目标
    /// * `progress` - 已处理行数计数器，只用于进度展示
    pub fn new(
        size: usize,
        store: Arc<dyn PromotionStore>,
        serializer: JsonSerializer,
        progress: Arc<AtomicU64>,
    ) -> Self {
        Self {
            size: size.max(1),
            store,
            serializer,
            progress,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// 启动所有工作者
    ///
    /// 行队列关闭且取空后工作者自然结束，返回的 `JoinSet` 交给 [`join_workers`] 汇合
    pub fn spawn(&self, lines: mpsc::Receiver<String>) -> JoinSet<WorkerReport> {
        let lines = Arc::new(Mutex::new(lines));
        let mut workers = JoinSet::new();

        for worker_id in 0..self.size {
            workers.spawn(run_worker(
                worker_id,
                lines.clone(),
                self.store.clone(),
                self.serializer,
                self.progress.clone(),
            ));
        }

        debug!("Spawned {} workers", self.size);
        workers
    }
}

async fn run_worker(
    worker_id: usize,
    lines: Arc<Mutex<mpsc::Receiver<String>>>,
    store: Arc<dyn PromotionStore>,
    serializer: JsonSerializer,
    progress: Arc<AtomicU64>,
) -> WorkerReport {
    let mut report = WorkerReport::default();

    loop {
        let next = { lines.lock().await.recv().await };
        let Some(line) = next else {
            break;
        };

        report.processed += 1;
        store_line(&line, store.as_ref(), &serializer, &mut report).await;
        progress.fetch_add(1, Ordering::Relaxed);
    }

    debug!(
        "Worker {} drained: processed={}, stored={}",
        worker_id, report.processed, report.stored
    );
    report
}

/// 解析、序列化并写入一行
///
/// 任何失败都只记录日志并丢弃该行，快照在周期内不变，重试没有意义
async fn store_line(
    line: &str,
    store: &dyn PromotionStore,
    serializer: &JsonSerializer,
    report: &mut WorkerReport,
) {
    let promotion = match parse_line(line) {
        Ok(promotion) => promotion,
        Err(e) => {
            warn!(line, error = %e, "Can't parse promotion, line dropped");
            report.parse_failures += 1;
            return;
        }
    };

    let bytes = match serializer.serialize(&promotion) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(id = %promotion.id, error = %e, "Can't serialize promotion");
            report.serialize_failures += 1;
            return;
        }
    };

    match store.set(&promotion.id, bytes).await {
        Ok(()) => report.stored += 1,
        Err(e) => {
            error!(id = %promotion.id, store = store.name(), error = %e, "Can't write promotion to the store");
            report.write_failures += 1;
        }
    }
}

/// 等待所有工作者结束并汇总统计
///
/// 只返回一次，返回时没有任何工作者仍在运行。异常终止的工作者会被计数，不会被忽略。
pub async fn join_workers(mut workers: JoinSet<WorkerReport>) -> PipelineReport {
    let mut report = PipelineReport::default();

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(worker_report) => {
                report.workers_joined += 1;
                report.totals.merge(&worker_report);
            }
            Err(e) => {
                error!(error = %e, "Worker task terminated abnormally");
                report.worker_panics += 1;
            }
        }
    }

    let totals = &report.totals;
    GLOBAL_METRICS.record_lines("stored", totals.stored);
    GLOBAL_METRICS.record_lines("parse_failed", totals.parse_failures);
    GLOBAL_METRICS.record_lines("serialize_failed", totals.serialize_failures);
    GLOBAL_METRICS.record_lines("write_failed", totals.write_failures);

    report
}
