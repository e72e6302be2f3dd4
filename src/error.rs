//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了促销缓存系统的错误类型和处理机制。

use std::path::PathBuf;
use thiserror::Error;

/// 快照行解析错误
///
/// 单行解析失败只会丢弃该行，不会中断整个重建周期
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// 字段数量不为3，或者id为空
    #[error("Malformed line: {0}")]
    MalformedLine(String),

    /// 价格不是合法的十进制数
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// 过期时间无法解析
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// 缓存系统错误类型枚举
#[derive(Error, Debug)]
pub enum CacheError {
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 存储后端错误
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 周期开始时无法打开快照文件
    #[error("Source snapshot unavailable: {}: {source}", .path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 已有重建周期在运行，本次触发被拒绝
    #[error("Rebuild already in progress (generation {generation})")]
    RebuildAlreadyInProgress { generation: u64 },

    /// 查询等待重建完成超时，可重试
    #[error("Rebuild in progress, lookup gave up after {waited_ms}ms")]
    RebuildInProgress { waited_ms: u64 },

    /// 当前代中不存在该促销记录
    #[error("Promotion not found: {0}")]
    NotFound(String),
}

impl CacheError {
    /// 调用方稍后重试是否可能成功
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CacheError::RebuildInProgress { .. }
                | CacheError::RebuildAlreadyInProgress { .. }
                | CacheError::Timeout(_)
        )
    }
}

/// 缓存操作结果类型别名
pub type Result<T> = std::result::Result<T, CacheError>;
