//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了单次重建命令的实现。

use crate::backend::build_store;
use crate::cli::RebuildArgs;
use crate::config::Config;
use crate::sync::{RebuildCoordinator, RebuildReport};
use anyhow::{Context, Result};

pub async fn execute(mut config: Config, args: &RebuildArgs) -> Result<()> {
    if let Some(source) = &args.source {
        config.source.path = source.clone();
    }
    if let Some(workers) = args.workers {
        config.pool.workers = workers;
    }
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid rebuild options")?;

    let store = build_store(&config.store)
        .await
        .context("Can't connect to the promotion store")?;
    let coordinator = RebuildCoordinator::from_config(&config, store);

    println!(
        "Rebuilding from {} with {} workers...",
        config.source.path.display(),
        config.pool.workers
    );
    let report = coordinator.rebuild().await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RebuildReport) {
    let status = if report.is_complete() {
        "✅ COMPLETED"
    } else {
        "⚠️ PARTIAL"
    };
    println!("\n=== Rebuild Generation {} ===\n", report.generation);
    println!("Status:              {}", status);
    println!("Lines Read:          {}", report.lines_read);
    println!("Stored:              {}", report.stored);
    println!("Parse Failures:      {}", report.parse_failures);
    println!("Serialize Failures:  {}", report.serialize_failures);
    println!("Write Failures:      {}", report.write_failures);
    if report.worker_panics > 0 {
        println!("Worker Panics:       {}", report.worker_panics);
    }
    if let Some(reason) = &report.interrupted {
        println!("Interrupted:         {}", reason);
    }
    println!("Duration:            {}ms", report.duration_ms);
}
