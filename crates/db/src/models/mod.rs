//! Row structs for the engine's tables.
//!
//! Each row type derives `FromRow` and converts into its `vorder_core`
//! record with `TryFrom`, failing with [`StoreError::Corrupt`] when a stored
//! status code is unknown.
//!
//! [`StoreError::Corrupt`]: vorder_core::store::StoreError::Corrupt

pub mod bonus;
pub mod pool;
pub mod resource;
pub mod service;
pub mod stats;
pub mod task;
