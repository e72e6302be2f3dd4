//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了周期性触发重建的调度器。

use super::rebuild::RebuildCoordinator;
use crate::config::ScheduleConfig;
use crate::error::CacheError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 重建调度器
///
/// 每个周期向协调器发出一次触发。上一个周期仍在运行时触发会被拒绝，
/// 调度器只记录日志，不会排队。
pub struct Scheduler {
    coordinator: Arc<RebuildCoordinator>,
    interval: Duration,
    run_on_start: bool,
}

impl Scheduler {
    pub fn new(coordinator: Arc<RebuildCoordinator>, config: &ScheduleConfig) -> Self {
        Self {
            coordinator,
            interval: config.interval(),
            run_on_start: config.run_on_start,
        }
    }

    /// 覆盖触发间隔
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// 运行调度循环，直到 `shutdown` 被取消
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            "Rebuild scheduler started: every {:?}, run_on_start={}",
            self.interval, self.run_on_start
        );

        let start = if self.run_on_start {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };
        let mut ticker = interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Rebuild scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    // 关闭时放弃正在运行的周期，意图释放后状态回到 Idle
                    tokio::select! {
                        _ = shutdown.cancelled() => warn!("Shutdown requested during a rebuild, cycle abandoned"),
                        _ = self.fire() => {}
                    }
                }
            }
        }
    }

    /// 执行一次触发
    ///
    /// 周期在当前任务内运行，因此调度循环在周期结束前不会再次触发
    pub async fn fire(&self) {
        debug!("Scheduled rebuild tick");
        match self.coordinator.rebuild().await {
            Ok(report) if report.is_complete() => {
                debug!("Scheduled rebuild of generation {} finished", report.generation);
            }
            Ok(report) => {
                warn!(
                    "Scheduled rebuild of generation {} finished with a partial snapshot",
                    report.generation
                );
            }
            Err(CacheError::RebuildAlreadyInProgress { generation }) => {
                warn!(
                    "Skipping scheduled rebuild, generation {} is still running",
                    generation
                );
            }
            Err(e) => error!("Scheduled rebuild failed: {}", e),
        }
    }
}
