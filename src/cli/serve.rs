//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了服务命令的实现。

use crate::backend::build_store;
use crate::config::Config;
use crate::server::{self, AppState};
use crate::sync::{ReadGate, RebuildCoordinator, Scheduler};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub async fn execute(config: Config) -> Result<()> {
    let store = build_store(&config.store)
        .await
        .context("Can't connect to the promotion store")?;
    info!("Using {} store, snapshot {}", store.name(), config.source.path.display());

    let coordinator = Arc::new(RebuildCoordinator::from_config(&config, store.clone()));
    let gate = ReadGate::new(store, coordinator.subscribe(), &config.read_gate);
    let shutdown = CancellationToken::new();

    let scheduler = tokio::spawn(
        Scheduler::new(coordinator.clone(), &config.schedule).run(shutdown.clone()),
    );

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Can't listen for the shutdown signal: {}", e),
        }
        signal.cancel();
    });

    let state = AppState { gate, coordinator };
    let served = server::serve(&config.server.listen_addr, state, shutdown.clone()).await;

    shutdown.cancel();
    scheduler.await.context("Rebuild scheduler terminated abnormally")?;
    served.context("HTTP server failed")?;
    Ok(())
}
