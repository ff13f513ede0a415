//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that take
//! `&mut PgConnection` as the first argument, so callers decide whether a
//! statement runs inside a transaction (it always does from [`PgStore`]).
//!
//! [`PgStore`]: crate::store::PgStore

pub mod bonus_repo;
pub mod config_repo;
pub mod image_repo;
pub mod pool_repo;
pub mod service_repo;
pub mod stats_repo;
pub mod student_repo;
pub mod task_repo;

pub use bonus_repo::BonusRepo;
pub use config_repo::ConfigRepo;
pub use image_repo::ImageRepo;
pub use pool_repo::SubsidyPoolRepo;
pub use service_repo::VirtualServiceRepo;
pub use stats_repo::StatsRepo;
pub use student_repo::StudentRepo;
pub use task_repo::TaskRepo;
