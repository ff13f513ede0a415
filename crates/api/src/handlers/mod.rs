pub mod bonus;
pub mod maintenance;
pub mod pools;
pub mod services;
pub mod settings;
pub mod stats;
pub mod students;
pub mod tasks;
