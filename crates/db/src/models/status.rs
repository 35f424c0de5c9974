//! Status enums backed by the lookup tables.
//!
//! The enums live in `assetflow_core::status` so the state machines can use
//! them; this module re-exports them for repository callers.

pub use assetflow_core::status::{
    AnalystState, DependState, DependType, JobState, LockState, StatusId, TaskState,
};
