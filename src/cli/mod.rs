//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::config::Config;
use crate::telemetry::init_tracing;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "promocache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Path to the TOML configuration file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "serve", about = "Serve lookups and rebuild the store on schedule")]
    Serve,

    #[command(name = "rebuild", about = "Run one rebuild cycle and exit")]
    Rebuild(RebuildArgs),

    #[command(name = "lookup", about = "Look up one promotion through the read gate")]
    Lookup(LookupArgs),

    #[command(name = "check-config", about = "Validate and print the effective configuration")]
    CheckConfig,
}

#[derive(Parser, Debug)]
pub struct RebuildArgs {
    #[arg(short, long, help = "Snapshot file to load instead of source.path")]
    pub source: Option<PathBuf>,

    #[arg(short, long, help = "Number of workers instead of pool.workers")]
    pub workers: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct LookupArgs {
    #[arg(help = "Promotion id")]
    pub id: String,
}

mod check_config;
mod lookup;
mod rebuild;
mod serve;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Invalid configuration")?;
    init_tracing(env!("CARGO_PKG_NAME"), &config.log.filter);

    match &cli.command {
        Commands::Serve => serve::execute(config).await,
        Commands::Rebuild(args) => rebuild::execute(config, args).await,
        Commands::Lookup(args) => lookup::execute(config, args).await,
        Commands::CheckConfig => check_config::execute(&config),
    }
}
