//! Orchestration of the virtual order engine.
//!
//! [`VirtualOrderEngine`] composes the pure rules in `vorder_core` with a
//! [`Store`](vorder_core::store::Store): it owns the transaction boundaries,
//! the random source, and the clock. [`scheduler::Scheduler`] drives the
//! periodic sweeps, and [`memory::MemoryStore`] backs tests and local runs.

pub mod allocator;
mod audit;
pub mod bonus;
pub mod config;
mod engine;
pub mod ledger;
pub mod lifecycle;
pub mod memory;
pub mod reporting;
pub mod scheduler;
pub mod services;

pub use config::{EngineConfig, SchedulerConfig};
pub use engine::VirtualOrderEngine;

use vorder_core::error::CoreError;
use vorder_core::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;
