//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了促销缓存服务的配置结构、加载与校验逻辑。

use crate::error::{CacheError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 服务配置
///
/// 从TOML文件加载，随后应用环境变量覆盖
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub pool: PoolConfig,
    pub schedule: ScheduleConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub read_gate: ReadGateConfig,
    pub log: LogConfig,
}

/// 快照来源配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SourceConfig {
    /// 快照文件路径
    pub path: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("promotions.csv"),
        }
    }
}

/// 工作池配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PoolConfig {
    /// 并发工作者数量
    pub workers: usize,
    /// 行队列容量，0表示使用 2 × workers
    pub channel_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 100,
            channel_capacity: 0,
        }
    }
}

impl PoolConfig {
    pub fn effective_channel_capacity(&self) -> usize {
        if self.channel_capacity > 0 {
            self.channel_capacity
        } else {
            self.workers.max(1).saturating_mul(2)
        }
    }
}

/// 定时重建配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ScheduleConfig {
    /// 重建间隔（分钟）
    pub interval_minutes: u64,
    /// 启动时是否立即执行一次重建
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            run_on_start: true,
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }
}

/// 存储后端类型
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// 进程内存储
    Memory,
    /// Redis存储
    #[default]
    Redis,
}

/// 存储配置
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis: RedisConfig,
}

/// Redis模式枚举
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedisMode {
    /// 单机模式
    #[default]
    Standalone,
    /// 哨兵模式
    Sentinel,
}

/// 哨兵配置
#[derive(Deserialize, Clone, Debug)]
pub struct SentinelConfig {
    /// 主节点名称
    pub master_name: String,
    /// 哨兵节点列表
    pub nodes: Vec<String>,
}

/// Redis连接配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RedisConfig {
    pub mode: RedisMode,
    /// 连接字符串
    pub connection_string: SecretString,
    /// Redis 密码（可选）
    pub password: Option<SecretString>,
    /// 是否启用 TLS
    pub enable_tls: bool,
    /// 哨兵配置
    pub sentinel: Option<SentinelConfig>,
    /// 所有促销键的前缀，清空存储时只删除该前缀下的键
    pub key_prefix: String,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            mode: RedisMode::Standalone,
            connection_string: SecretString::new("redis://localhost:6379".to_string().into()),
            password: None,
            enable_tls: false,
            sentinel: None,
            key_prefix: "promotion:".to_string(),
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
        }
    }
}

/// HTTP服务配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:1321".to_string(),
        }
    }
}

/// 重建期间的读取策略
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// 阻塞等待重建结束，超时返回可重试错误
    #[default]
    Block,
    /// 不等待，返回可能不完整的视图并标记
    BestEffort,
}

/// 读取闸门配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ReadGateConfig {
    pub mode: ReadMode,
    /// 阻塞模式下的最长等待时间（毫秒）
    pub wait_timeout_ms: u64,
}

impl Default for ReadGateConfig {
    fn default() -> Self {
        Self {
            mode: ReadMode::Block,
            wait_timeout_ms: 5000,
        }
    }
}

impl ReadGateConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// 日志配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` 指令，`RUST_LOG` 优先
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// 加载配置
    ///
    /// 有路径时读取TOML文件，否则使用默认值；随后应用环境变量覆盖并校验
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate().map_err(CacheError::ConfigError)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CacheError::ConfigError(format!("Can't read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CacheError::ConfigError(e.to_string()))
    }

    /// 应用覆盖项
    ///
    /// `lookup` 通常是环境变量读取函数，空值视为未设置
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get("PROMOCACHE_SOURCE") {
            self.source.path = PathBuf::from(path);
        }
        if let Some(workers) = get("PROMOCACHE_WORKERS") {
            self.pool.workers = parse_number("PROMOCACHE_WORKERS", &workers)?;
        }
        if let Some(minutes) = get("PROMOCACHE_INTERVAL_MINUTES") {
            self.schedule.interval_minutes = parse_number("PROMOCACHE_INTERVAL_MINUTES", &minutes)?;
        }
        if let Some(backend) = get("PROMOCACHE_STORE") {
            self.store.backend = match backend.to_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "redis" => StoreBackend::Redis,
                other => {
                    return Err(CacheError::ConfigError(format!(
                        "PROMOCACHE_STORE must be 'memory' or 'redis', got '{}'",
                        other
                    )))
                }
            };
        }

        let host = get("REDIS_HOST");
        let port = get("REDIS_PORT");
        if host.is_some() || port.is_some() {
            let host = host.unwrap_or_else(|| "localhost".to_string());
            let port = port.unwrap_or_else(|| "6379".to_string());
            parse_number::<u16>("REDIS_PORT", &port)?;
            let scheme = if self.store.redis.enable_tls { "rediss" } else { "redis" };
            self.store.redis.connection_string =
                SecretString::new(format!("{}://{}:{}", scheme, host, port).into());
        }
        if let Some(password) = get("REDIS_PASSWORD") {
            self.store.redis.password = Some(SecretString::new(password.into()));
        }

        if let Some(port) = get("PORT") {
            parse_number::<u16>("PORT", &port)?;
            let host = self
                .server
                .listen_addr
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.server.listen_addr = format!("{}:{}", host, port);
        }

        Ok(())
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有值都在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.source.path.as_os_str().is_empty() {
            return Err("source.path cannot be empty".to_string());
        }

        if self.pool.workers == 0 || self.pool.workers > 10_000 {
            return Err("pool.workers must be between 1 and 10000".to_string());
        }

        if self.pool.channel_capacity > 1_000_000 {
            return Err("pool.channel_capacity cannot exceed 1000000".to_string());
        }

        if self.schedule.interval_minutes == 0 {
            return Err("schedule.interval_minutes cannot be zero".to_string());
        }

        if self.schedule.interval_minutes > 60 * 24 * 7 {
            return Err("schedule.interval_minutes cannot exceed one week".to_string());
        }

        if !(10..=600_000).contains(&self.read_gate.wait_timeout_ms) {
            return Err("read_gate.wait_timeout_ms must be between 10 and 600000 ms".to_string());
        }

        if self.server.listen_addr.trim().is_empty() {
            return Err("server.listen_addr cannot be empty".to_string());
        }

        if self.store.backend == StoreBackend::Redis {
            let redis = &self.store.redis;

            if redis.key_prefix.is_empty() {
                return Err("store.redis.key_prefix cannot be empty".to_string());
            }

            // 前缀会被拼进 SCAN MATCH 模式
            if redis
                .key_prefix
                .chars()
                .any(|c| matches!(c, '*' | '?' | '[' | ']' | '\\'))
            {
                return Err("store.redis.key_prefix cannot contain glob characters".to_string());
            }

            if !(100..=30_000).contains(&redis.connection_timeout_ms) {
                return Err(
                    "store.redis.connection_timeout_ms must be between 100 and 30000 ms"
                        .to_string(),
                );
            }

            if !(100..=60_000).contains(&redis.command_timeout_ms) {
                return Err(
                    "store.redis.command_timeout_ms must be between 100 and 60000 ms".to_string(),
                );
            }

            match redis.mode {
                RedisMode::Standalone => {
                    if redis.connection_string.expose_secret().trim().is_empty() {
                        return Err("store.redis.connection_string cannot be empty".to_string());
                    }
                }
                RedisMode::Sentinel => match &redis.sentinel {
                    Some(sentinel) if !sentinel.nodes.is_empty() => {
                        if sentinel.master_name.is_empty() {
                            return Err("store.redis.sentinel.master_name cannot be empty".to_string());
                        }
                    }
                    _ => {
                        return Err(
                            "store.redis.sentinel.nodes are required in sentinel mode".to_string()
                        )
                    }
                },
            }
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CacheError::ConfigError(format!("{} must be a number, got '{}'", key, value)))
}
