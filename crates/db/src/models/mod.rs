//! Row models and DTOs, one module per table family.

pub mod analyst;
pub mod cluster_lock;
pub mod depend;
pub mod job;
pub mod pipeline_mod;
pub mod status;
pub mod task;
pub mod task_error;
