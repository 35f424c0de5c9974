//! Scheduling engine.
//!
//! Everything here coordinates through conditional writes in PostgreSQL;
//! no task state is held in process memory, so any number of API replicas
//! can serve analysts at once.
//!
//! - [`job_launcher`] -- resolves pipelines and persists a new job.
//! - [`dispatcher`] -- hands the next task to an analyst.
//! - [`lifecycle`] -- applies analyst events to task and job state.
//! - [`reclaim`] -- pulls tasks back from dead analysts.
//! - [`cluster_lock`] -- runs a closure under a named cluster lock.

pub mod cluster_lock;
pub mod dispatcher;
pub mod job_launcher;
pub mod lifecycle;
pub mod reclaim;
