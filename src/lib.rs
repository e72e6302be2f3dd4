//! promocache - 促销价格缓存服务
//!
//! 定期从快照文件全量重建促销存储，重建由固定大小的工作池并发写入，
//! 查询经由读取闸门，重建期间不会把尚未写入的记录误报为不存在。

#![doc(html_root_url = "https://docs.rs/promocache/0.1.0")]

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod promotion;
pub mod serialization;
pub mod server;
pub mod sync;
pub mod telemetry;
pub mod utils;

// Re-export commonly used items
pub use backend::{MemoryStore, PromotionStore, RedisStore};
pub use config::Config;
pub use error::{CacheError, ParseError, Result};
pub use promotion::{parse_line, Price, Promotion};
pub use sync::{ReadGate, RebuildCoordinator, RebuildReport, RebuildState, Scheduler};

/// promocache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
