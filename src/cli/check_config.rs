//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了配置检查命令的实现。

use crate::config::{Config, StoreBackend};
use crate::utils::redaction::redact_connection_string;
use anyhow::Result;
use secrecy::ExposeSecret;

pub fn execute(config: &Config) -> Result<()> {
    println!("=== Effective Configuration ===\n");
    println!("Source:            {}", config.source.path.display());
    println!(
        "Workers:           {} (queue {})",
        config.pool.workers,
        config.pool.effective_channel_capacity()
    );
    println!(
        "Schedule:          every {} min, run on start: {}",
        config.schedule.interval_minutes, config.schedule.run_on_start
    );
    println!("Listen:            {}", config.server.listen_addr);
    println!(
        "Read Gate:         {:?}, wait {}ms",
        config.read_gate.mode, config.read_gate.wait_timeout_ms
    );

    match config.store.backend {
        StoreBackend::Memory => println!("Store:             memory"),
        StoreBackend::Redis => {
            let redis = &config.store.redis;
            println!("Store:             redis ({:?})", redis.mode);
            println!(
                "Connection:        {}",
                redact_connection_string(redis.connection_string.expose_secret())
            );
            println!(
                "Password:          {}",
                if redis.password.is_some() { "****" } else { "(none)" }
            );
            println!("Key Prefix:        {}", redis.key_prefix);
        }
    }

    println!("\n✅ Configuration is valid.");
    Ok(())
}
