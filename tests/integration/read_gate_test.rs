//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 读取闸门集成测试

use crate::common::{coordinator_for, promotion_line, setup_logging, write_snapshot, SlowStore};
use promocache::config::{ReadGateConfig, ReadMode};
use promocache::error::CacheError;
use promocache::metrics::GLOBAL_METRICS;
use promocache::ReadGate;
use std::sync::Arc;
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

fn gate_config(mode: ReadMode, wait_timeout_ms: u64) -> ReadGateConfig {
    ReadGateConfig {
        mode,
        wait_timeout_ms,
    }
}

fn snapshot_lines(count: usize, price: &str) -> Vec<String> {
    (0..count)
        .map(|i| promotion_line(&format!("p-{}", i), price))
        .collect()
}

/// 测试阻塞读取在重建期间等待并读到新一代的值
///
/// 重建刚开始时存储已被清空，读取不能返回不存在，也不能返回旧值
#[tokio::test]
async fn test_blocking_reader_sees_fresh_generation() {
    setup_logging();

    let snapshot = write_snapshot(&snapshot_lines(20, "1.00"));
    let store = Arc::new(SlowStore::new(Duration::from_millis(10)));
    let coordinator = coordinator_for(store.clone(), snapshot.path(), 1);
    coordinator.rebuild().await.unwrap();

    std::fs::write(snapshot.path(), snapshot_lines(20, "3.00").join("\n")).unwrap();

    let gate = ReadGate::new(
        store.clone(),
        coordinator.subscribe(),
        &gate_config(ReadMode::Block, 5000),
    );

    coordinator.spawn_rebuild().unwrap();
    let lookups = (0..20).map(|i| {
        let gate = gate.clone();
        async move { gate.lookup(&format!("p-{}", i)).await }
    });
    let results = futures::future::join_all(lookups).await;

    for result in results {
        let found = result.unwrap();
        assert!(!found.partial);
        assert_eq!(found.promotion.price.cents(), 300);
    }
    assert!(coordinator.state().is_idle());
    assert_eq!(coordinator.state().generation, 2);
}

/// 测试读取进行中开始重建时，阻塞读取会在新一代完成后重新读取
///
/// 读取发生在清空之后、该行写入之前，旧代的读取结果必须被丢弃
#[tokio::test]
async fn test_blocking_reader_rereads_after_overlapping_rebuild() {
    setup_logging();

    let snapshot = write_snapshot(&snapshot_lines(5, "1.00"));
    let store = Arc::new(SlowStore::new(Duration::ZERO));
    let coordinator = coordinator_for(store.clone(), snapshot.path(), 1);
    coordinator.rebuild().await.unwrap();

    std::fs::write(snapshot.path(), snapshot_lines(5, "3.00").join("\n")).unwrap();
    store.set_delay(Duration::from_millis(30));
    store.set_read_delay(Duration::from_millis(100));

    let gate = ReadGate::new(
        store.clone(),
        coordinator.subscribe(),
        &gate_config(ReadMode::Block, 5000),
    );

    let lookup = tokio::spawn({
        let gate = gate.clone();
        async move { gate.lookup("p-4").await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    coordinator.spawn_rebuild().unwrap();

    let found = lookup.await.unwrap().unwrap();
    assert!(!found.partial);
    assert_eq!(found.promotion.price.cents(), 300);
    assert!(coordinator.state().is_idle());
    assert_eq!(coordinator.state().generation, 2);
}

/// 测试重建超过等待时间时返回可重试错误
#[tokio::test]
async fn test_blocking_reader_times_out() {
    let snapshot = write_snapshot(&snapshot_lines(20, "1.00"));
    let store = Arc::new(SlowStore::new(Duration::from_millis(50)));
    let coordinator = coordinator_for(store.clone(), snapshot.path(), 1);
    let gate = ReadGate::new(
        store.clone(),
        coordinator.subscribe(),
        &gate_config(ReadMode::Block, 30),
    );

    coordinator.spawn_rebuild().unwrap();
    let err = gate.lookup("p-0").await.unwrap_err();

    assert!(err.is_retryable());
    assert!(matches!(err, CacheError::RebuildInProgress { waited_ms } if waited_ms >= 30));
    assert!(GLOBAL_METRICS.lookup_count("rebuild_in_progress") >= 1);
}

/// 测试尽力模式下的部分结果标记
#[tokio::test]
async fn test_best_effort_reader_reports_partial_view() {
    let snapshot = write_snapshot(&snapshot_lines(20, "1.00"));
    let store = Arc::new(SlowStore::new(Duration::from_millis(20)));
    let coordinator = coordinator_for(store.clone(), snapshot.path(), 1);
    let gate = ReadGate::new(
        store.clone(),
        coordinator.subscribe(),
        &gate_config(ReadMode::BestEffort, 5000),
    );

    coordinator.spawn_rebuild().unwrap();

    // 最后一行在周期结束前不会写入
    match gate.lookup("p-19").await {
        Err(CacheError::RebuildInProgress { waited_ms }) => assert_eq!(waited_ms, 0),
        Ok(found) => assert!(found.partial),
        Err(e) => panic!("unexpected error: {}", e),
    }

    let mut state = coordinator.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| s.is_idle()),
    )
    .await
    .unwrap()
    .unwrap();

    let found = gate.lookup("p-19").await.unwrap();
    assert!(!found.partial);
}

/// 测试空闲时查询不存在的编号
#[tokio::test]
async fn test_missing_id_is_not_found_when_idle() {
    let snapshot = write_snapshot(&snapshot_lines(3, "1.00"));
    let store = Arc::new(SlowStore::new(Duration::ZERO));
    let coordinator = coordinator_for(store.clone(), snapshot.path(), 2);
    coordinator.rebuild().await.unwrap();

    for mode in [ReadMode::Block, ReadMode::BestEffort] {
        let gate = ReadGate::new(store.clone(), coordinator.subscribe(), &gate_config(mode, 100));
        assert!(matches!(
            gate.lookup("p-404").await,
            Err(CacheError::NotFound(id)) if id == "p-404"
        ));
    }
}
