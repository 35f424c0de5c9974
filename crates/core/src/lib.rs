pub mod analyst;
pub mod cluster_lock;
pub mod error;
pub mod hashing;
pub mod scheduling;
pub mod status;
pub mod types;
pub mod zps;
