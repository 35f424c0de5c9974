//! Request extractors.
//!
//! - [`analyst::AnalystEndpoint`] -- Identifies the calling analyst by the `x-analyst-endpoint` header.
//! - [`project::ProjectId`] -- Project scope from the `x-project-id` header.

pub mod analyst;
pub mod project;
