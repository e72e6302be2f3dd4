//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了存储与快照的同步机制，包括重建协调、工作池、读取闸门和定时调度。

pub mod gate;
pub mod rebuild;
pub mod scheduler;
pub mod worker_pool;

pub use gate::{Lookup, ReadGate};
pub use rebuild::{RebuildCoordinator, RebuildPhase, RebuildReport, RebuildState, RebuildStatus};
pub use scheduler::Scheduler;
pub use worker_pool::{join_workers, PipelineReport, WorkerPool, WorkerReport};
