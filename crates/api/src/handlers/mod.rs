//! HTTP handlers, one module per resource.

pub mod analyst;
pub mod jobs;
pub mod pipeline_mods;
pub mod tasks;
