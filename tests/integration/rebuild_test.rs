//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 重建周期集成测试

use crate::common::{coordinator_for, promotion_line, setup_logging, write_snapshot, FlakyStore, SlowStore};
use promocache::backend::{MemoryStore, PromotionStore};
use promocache::error::CacheError;
use promocache::{Promotion, RebuildState};
use std::io::{self, Write};
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader, ReadBuf};

#[path = "../common/mod.rs"]
mod common;

async fn stored(store: &dyn PromotionStore, id: &str) -> Option<Promotion> {
    store
        .get(id)
        .await
        .unwrap()
        .map(|raw| serde_json::from_slice(&raw).unwrap())
}

/// 测试格式正确与错误的行混合时的计数
///
/// K条正确记录全部写入，M条错误记录全部被丢弃
#[tokio::test]
async fn test_well_formed_and_malformed_lines() {
    setup_logging();

    let mut lines: Vec<String> = (0..40).map(|i| promotion_line(&format!("p-{}", i), "9.99")).collect();
    lines.push("p-x,9.99".to_string());
    lines.push("p-y,nine,2030-06-01 12:00:00 +0200".to_string());
    lines.push("p-z,9.99,not-a-date".to_string());
    lines.push(String::new());
    let snapshot = write_snapshot(&lines);

    let store = Arc::new(MemoryStore::new());
    let coordinator = coordinator_for(store.clone(), snapshot.path(), 8);
    let report = coordinator.rebuild().await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.lines_read, 44);
    assert_eq!(report.stored, 40);
    assert_eq!(report.parse_failures, 4);
    assert_eq!(store.len().await.unwrap(), 40);
    assert!(stored(store.as_ref(), "p-x").await.is_none());
}

/// 测试重复编号只保留一条记录
#[tokio::test]
async fn test_duplicate_ids_keep_one_record() {
    let snapshot = write_snapshot(&[promotion_line("dup", "1.00"), promotion_line("dup", "2.00")]);

    let store = Arc::new(MemoryStore::new());
    let coordinator = coordinator_for(store.clone(), snapshot.path(), 4);
    coordinator.rebuild().await.unwrap();

    assert_eq!(store.len().await.unwrap(), 1);
    let price = stored(store.as_ref(), "dup").await.unwrap().price.cents();
    assert!(price == 100 || price == 200);
}

/// 测试工作者数量不影响结果
#[tokio::test]
async fn test_worker_count_does_not_change_result() {
    let lines: Vec<String> = (0..500)
        .map(|i| promotion_line(&format!("p-{}", i), &format!("{}.{:03}", i, i % 1000)))
        .collect();
    let snapshot = write_snapshot(&lines);

    let single = Arc::new(MemoryStore::new());
    coordinator_for(single.clone(), snapshot.path(), 1).rebuild().await.unwrap();

    let many = Arc::new(MemoryStore::new());
    coordinator_for(many.clone(), snapshot.path(), 100).rebuild().await.unwrap();

    assert_eq!(single.keys(), many.keys());
    for key in single.keys() {
        assert_eq!(single.get(&key).await.unwrap(), many.get(&key).await.unwrap());
    }
}

/// 测试重建后不残留上一代的记录
#[tokio::test]
async fn test_no_stale_records_after_rebuild() {
    let store = Arc::new(MemoryStore::new());

    let first = write_snapshot(&[promotion_line("a", "1.00"), promotion_line("b", "2.00")]);
    coordinator_for(store.clone(), first.path(), 2).rebuild().await.unwrap();
    assert_eq!(store.keys(), vec!["a", "b"]);

    let second = write_snapshot(&[promotion_line("a", "3.001")]);
    coordinator_for(store.clone(), second.path(), 2).rebuild().await.unwrap();

    assert_eq!(store.keys(), vec!["a"]);
    assert_eq!(stored(store.as_ref(), "a").await.unwrap().price.cents(), 301);
    assert!(stored(store.as_ref(), "b").await.is_none());
}

/// 测试重建期间的第二次触发被拒绝
///
/// 被拒绝的触发不会清空存储，也不会改变代号
#[tokio::test]
async fn test_concurrent_trigger_is_rejected() {
    setup_logging();

    let lines: Vec<String> = (0..10).map(|i| promotion_line(&format!("p-{}", i), "1.00")).collect();
    let snapshot = write_snapshot(&lines);
    let store = Arc::new(SlowStore::new(Duration::from_millis(20)));
    let coordinator = coordinator_for(store.clone(), snapshot.path(), 1);

    let generation = coordinator.spawn_rebuild().unwrap();
    assert_eq!(generation, 1);
    assert!(!coordinator.state().is_idle());

    match coordinator.rebuild().await {
        Err(CacheError::RebuildAlreadyInProgress { generation }) => assert_eq!(generation, 1),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(coordinator.spawn_rebuild().is_err());

    let mut state = coordinator.subscribe();
    let finished = tokio::time::timeout(Duration::from_secs(5), state.wait_for(RebuildState::is_idle))
        .await
        .expect("rebuild finished")
        .map(|s| *s)
        .unwrap();

    assert_eq!(finished.generation, 1);
    assert_eq!(store.len().await.unwrap(), 10);
    let report = coordinator.last_report().await.unwrap();
    assert_eq!(report.generation, 1);
    assert_eq!(report.stored, 10);
}

/// 读取到一半后返回I/O错误的快照来源
struct BrokenSnapshot;

impl AsyncRead for BrokenSnapshot {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::UnexpectedEof, "snapshot truncated")))
    }
}

/// 测试快照读取中断时周期仍然结束并回到空闲
#[tokio::test]
async fn test_interrupted_snapshot_still_completes() {
    let head = format!("{}\n{}\n", promotion_line("a", "1.00"), promotion_line("b", "2.00"));
    let reader = BufReader::new(std::io::Cursor::new(head.into_bytes()).chain(BrokenSnapshot));

    let store = Arc::new(MemoryStore::new());
    let coordinator = coordinator_for(store.clone(), Path::new("unused.csv"), 3);
    let report = coordinator.rebuild_from_reader(reader).await.unwrap();

    assert!(!report.is_complete());
    assert!(report.interrupted.as_deref().unwrap().contains("snapshot truncated"));
    assert_eq!(report.lines_read, 2);
    assert_eq!(store.keys(), vec!["a", "b"]);
    assert!(coordinator.state().is_idle());
    assert_eq!(coordinator.state().generation, 1);
}

/// 测试非UTF-8的行被跳过，之后的行照常写入
#[tokio::test]
async fn test_invalid_utf8_line_does_not_truncate_snapshot() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", promotion_line("a", "1.00")).unwrap();
    file.write_all(b"b\xff,2.00,2030-06-01 12:00:00 +0200\n").unwrap();
    file.write_all(b"c,3.00,2030-06-01 \xff\xfe 12:00:00 +0200\n").unwrap();
    writeln!(file, "{}", promotion_line("d", "4.00")).unwrap();
    writeln!(file, "{}", promotion_line("e", "5.00")).unwrap();
    file.flush().unwrap();

    let store = Arc::new(MemoryStore::new());
    let coordinator = coordinator_for(store.clone(), file.path(), 2);
    let report = coordinator.rebuild().await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.lines_read, 5);
    assert_eq!(report.stored, 3);
    assert_eq!(report.parse_failures, 2);
    assert_eq!(store.keys(), vec!["a", "d", "e"]);
    assert!(coordinator.state().is_idle());
}

/// 测试快照不存在时周期中止
#[tokio::test]
async fn test_missing_snapshot_aborts_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.set("old", b"{}".to_vec()).await.unwrap();

    let coordinator = coordinator_for(store.clone(), &dir.path().join("absent.csv"), 2);
    let err = coordinator.rebuild().await.unwrap_err();

    assert!(matches!(err, CacheError::SourceUnavailable { .. }));
    assert!(err.to_string().contains("absent.csv"));
    assert!(coordinator.state().is_idle());
    assert!(store.is_empty().await.unwrap());

    // 下一次触发仍然可以获取意图
    let snapshot = write_snapshot(&[promotion_line("a", "1.00")]);
    let retry = coordinator_for(store.clone(), snapshot.path(), 2);
    assert_eq!(retry.rebuild().await.unwrap().stored, 1);
}

/// 测试写入失败只计数不影响其他记录
#[tokio::test]
async fn test_write_failures_are_counted() {
    let snapshot = write_snapshot(&[
        promotion_line("ok-1", "1.00"),
        promotion_line("fail-1", "1.00"),
        promotion_line("ok-2", "1.00"),
        promotion_line("fail-2", "1.00"),
    ]);

    let store = Arc::new(FlakyStore::default());
    let coordinator = coordinator_for(store.clone(), snapshot.path(), 2);
    let report = coordinator.rebuild().await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.stored, 2);
    assert_eq!(report.write_failures, 2);
    assert_eq!(store.rejected.load(Ordering::SeqCst), 2);
    assert_eq!(store.inner.keys(), vec!["ok-1", "ok-2"]);
}
