//! Domain logic for the virtual order engine.
//!
//! Everything here is free of I/O: amount splitting, content generation,
//! allocation ranking, pool and bonus-pool bookkeeping, the task state
//! machine, and the store traits the engine is written against.

pub mod allocation;
pub mod bonus;
pub mod clock;
pub mod content;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod money;
pub mod rebate;
pub mod schedule;
pub mod settings;
pub mod splitter;
pub mod store;
pub mod task;
pub mod types;
