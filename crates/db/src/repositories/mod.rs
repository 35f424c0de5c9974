//! Repository layer: one zero-sized struct per table family, each exposing
//! async functions that take a `&PgPool`.

pub mod analyst_repo;
pub mod cluster_lock_repo;
pub mod depend_repo;
pub mod dispatch_repo;
pub mod job_repo;
pub mod pipeline_mod_repo;
pub mod task_error_repo;
pub mod task_repo;

pub use analyst_repo::AnalystRepo;
pub use cluster_lock_repo::ClusterLockRepo;
pub use depend_repo::DependRepo;
pub use dispatch_repo::DispatchRepo;
pub use job_repo::JobRepo;
pub use pipeline_mod_repo::PipelineModRepo;
pub use task_error_repo::TaskErrorRepo;
pub use task_repo::TaskRepo;
