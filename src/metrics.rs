//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了重建流水线和查询路径的指标收集功能。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// 指标收集器
///
/// 单行和单次写入的失败只在这里汇总，不会让整个周期失败
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 快照行处理结果统计
    /// key: "stored" / "parse_failed" / "serialize_failed" / "write_failed"
    pub lines_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 重建周期结果统计
    /// key: "completed" / "interrupted" / "source_unavailable" / "flush_failed" / "rejected"
    pub rebuilds_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 查询结果统计
    /// key: "hit" / "not_found" / "rebuild_in_progress" / "error"
    pub lookups_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 重建耗时 (total_duration_secs, count)
    pub rebuild_duration: Arc<Mutex<(f64, u64)>>,
    /// 最近一次完成的周期写入的记录数
    pub last_generation_size: Arc<Mutex<Option<u64>>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn increment(map: &Mutex<HashMap<String, u64>>, key: &str, by: u64) {
    if by == 0 {
        return;
    }
    *lock(map).entry(key.to_string()).or_insert(0) += by;
}

impl Metrics {
    /// 记录快照行处理结果
    pub fn record_lines(&self, outcome: &str, count: u64) {
        increment(&self.lines_total, outcome, count);
    }

    /// 记录重建周期结果
    pub fn record_rebuild(&self, outcome: &str) {
        increment(&self.rebuilds_total, outcome, 1);
    }

    /// 记录一次完成的重建
    pub fn record_rebuild_duration(&self, duration_secs: f64, stored: u64) {
        let mut duration = lock(&self.rebuild_duration);
        duration.0 += duration_secs;
        duration.1 += 1;
        *lock(&self.last_generation_size) = Some(stored);
    }

    /// 记录查询结果
    pub fn record_lookup(&self, result: &str) {
        increment(&self.lookups_total, result, 1);
    }

    pub fn lookup_count(&self, result: &str) -> u64 {
        lock(&self.lookups_total).get(result).copied().unwrap_or(0)
    }

    /// 以Prometheus文本格式输出所有指标
    pub fn render(&self) -> String {
        let mut output = String::new();

        let mut push_map = |name: &str, label: &str, map: &Mutex<HashMap<String, u64>>| {
            let map = lock(map);
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort();
            for (k, v) in entries {
                output.push_str(&format!("{}{{{}=\"{}\"}} {}\n", name, label, k, v));
            }
        };
        push_map("promocache_lines_total", "outcome", &self.lines_total);
        push_map("promocache_rebuilds_total", "outcome", &self.rebuilds_total);
        push_map("promocache_lookups_total", "result", &self.lookups_total);

        let (total, count) = *lock(&self.rebuild_duration);
        if count > 0 {
            output.push_str(&format!("promocache_rebuild_duration_seconds_sum {}\n", total));
            output.push_str(&format!("promocache_rebuild_duration_seconds_count {}\n", count));
        }
        if let Some(size) = *lock(&self.last_generation_size) {
            output.push_str(&format!("promocache_generation_size {}\n", size));
        }
        output
    }
}

/// 获取全局指标字符串
pub fn get_metrics_string() -> String {
    GLOBAL_METRICS.render()
}
