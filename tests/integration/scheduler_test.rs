//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 重建调度器集成测试

use crate::common::{coordinator_for, promotion_line, setup_logging, write_snapshot};
use promocache::backend::{MemoryStore, PromotionStore};
use promocache::config::ScheduleConfig;
use promocache::Scheduler;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[path = "../common/mod.rs"]
mod common;

/// 测试调度器按间隔重复触发并在取消后停止
#[tokio::test]
async fn test_scheduler_fires_repeatedly_until_cancelled() {
    setup_logging();

    let snapshot = write_snapshot(&[promotion_line("a", "1.00"), promotion_line("b", "2.00")]);
    let store = Arc::new(MemoryStore::new());
    let coordinator = coordinator_for(store.clone(), snapshot.path(), 2);

    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(coordinator.clone(), &ScheduleConfig::default())
        .with_interval(Duration::from_millis(50));
    let handle = tokio::spawn(scheduler.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(180)).await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler stopped")
        .unwrap();

    let state = coordinator.state();
    assert!(state.is_idle());
    assert!(state.generation >= 2, "generation {}", state.generation);
    assert_eq!(store.len().await.unwrap(), 2);

    // 取消后不再触发
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(coordinator.state().generation, state.generation);
}

/// 测试关闭启动即触发后，首个间隔到达前取消不会重建
#[tokio::test]
async fn test_scheduler_without_run_on_start_waits_for_interval() {
    let snapshot = write_snapshot(&[promotion_line("a", "1.00")]);
    let store = Arc::new(MemoryStore::new());
    let coordinator = coordinator_for(store.clone(), snapshot.path(), 1);

    let config = ScheduleConfig {
        interval_minutes: 1,
        run_on_start: false,
    };
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(Scheduler::new(coordinator.clone(), &config).run(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(coordinator.state().generation, 0);
    assert!(store.is_empty().await.unwrap());
}
