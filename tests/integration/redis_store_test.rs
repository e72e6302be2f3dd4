//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! Redis存储集成测试，Redis不可用时跳过

use crate::common::{is_redis_available, promotion_line, redis_url, setup_logging, write_snapshot};
use promocache::backend::{PromotionStore, RedisStore};
use promocache::config::{PoolConfig, RedisConfig};
use promocache::RebuildCoordinator;
use secrecy::SecretString;
use std::sync::Arc;

#[path = "../common/mod.rs"]
mod common;

fn redis_config(prefix: &str) -> RedisConfig {
    RedisConfig {
        connection_string: SecretString::new(redis_url().into()),
        key_prefix: prefix.to_string(),
        ..RedisConfig::default()
    }
}

fn unique_prefix(name: &str) -> String {
    format!("promocache-test:{}:{}:", name, std::process::id())
}

#[tokio::test]
async fn test_set_get_and_scoped_flush() {
    if !is_redis_available().await {
        println!("跳过测试: Redis不可用");
        return;
    }
    setup_logging();

    let prefix = unique_prefix("flush");
    let store = RedisStore::new(&redis_config(&prefix)).await.unwrap();
    assert_eq!(store.key_prefix(), prefix);
    let neighbour = RedisStore::new(&redis_config(&unique_prefix("neighbour"))).await.unwrap();

    store.ping().await.unwrap();
    store.set("p-1", b"one".to_vec()).await.unwrap();
    store.set("p-2", b"two".to_vec()).await.unwrap();
    neighbour.set("p-1", b"other".to_vec()).await.unwrap();

    assert_eq!(store.get("p-1").await.unwrap(), Some(b"one".to_vec()));
    assert_eq!(store.len().await.unwrap(), 2);

    store.flush().await.unwrap();
    assert!(store.is_empty().await.unwrap());
    assert_eq!(store.get("p-1").await.unwrap(), None);
    // 其他前缀下的键不受影响
    assert_eq!(neighbour.get("p-1").await.unwrap(), Some(b"other".to_vec()));

    neighbour.flush().await.unwrap();
}

#[tokio::test]
async fn test_rebuild_into_redis() {
    if !is_redis_available().await {
        println!("跳过测试: Redis不可用");
        return;
    }
    setup_logging();

    let lines: Vec<String> = (0..200)
        .map(|i| promotion_line(&format!("p-{}", i), "7.777"))
        .collect();
    let snapshot = write_snapshot(&lines);

    let store = Arc::new(RedisStore::new(&redis_config(&unique_prefix("rebuild"))).await.unwrap());
    store.set("stale", b"{}".to_vec()).await.unwrap();

    let pool = PoolConfig {
        workers: 16,
        channel_capacity: 0,
    };
    let coordinator = RebuildCoordinator::new(store.clone(), snapshot.path(), &pool);
    let report = coordinator.rebuild().await.unwrap();

    assert_eq!(report.stored, 200);
    assert_eq!(store.len().await.unwrap(), 200);
    assert_eq!(store.get("stale").await.unwrap(), None);
    assert_eq!(
        store.get("p-7").await.unwrap().unwrap(),
        br#"{"id":"p-7","price":7.78,"expiration_date":"2030-06-01 12:00:00"}"#.to_vec()
    );

    store.flush().await.unwrap();
}
