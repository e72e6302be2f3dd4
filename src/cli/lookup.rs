//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了查询命令的实现。

use crate::backend::build_store;
use crate::cli::LookupArgs;
use crate::config::Config;
use crate::error::CacheError;
use crate::sync::{ReadGate, RebuildCoordinator};
use anyhow::{Context, Result};

pub async fn execute(config: Config, args: &LookupArgs) -> Result<()> {
    let store = build_store(&config.store)
        .await
        .context("Can't connect to the promotion store")?;
    // 单独进程看不到服务中的重建状态，闸门始终视为空闲
    let coordinator = RebuildCoordinator::from_config(&config, store.clone());
    let gate = ReadGate::new(store, coordinator.subscribe(), &config.read_gate);

    match gate.lookup(&args.id).await {
        Ok(found) => {
            println!("{}", String::from_utf8_lossy(&found.raw));
            Ok(())
        }
        Err(CacheError::NotFound(id)) => {
            println!("Promotion '{}' not found.", id);
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Lookup of '{}' failed", args.id)),
    }
}
