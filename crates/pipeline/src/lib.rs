//! Pipeline module resolution.
//!
//! Turns an ordered list of pipeline module names into the concrete, sealed
//! `execute` list a task runs. [`loader`] reads the DEPEND closure from the
//! database into a [`ModuleCatalog`]; [`resolver`] is pure and
//! deterministic over that catalog.

pub mod error;
pub mod filter;
pub mod loader;
pub mod model;
pub mod resolver;
pub mod standard;

pub use error::PipelineError;
pub use model::{ModOp, ModOpType, OpFilter, OpFilterType, OpPayload, PipelineMod};
pub use resolver::{resolve, resolve_custom, ModuleCatalog, ResolvedPipeline, Seed};
