//! AssetFlow scheduler API library.
//!
//! Exposes configuration, state, error handling, the scheduling engine,
//! background loops and routes so integration tests and the binary
//! entrypoint share them.

pub mod background;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
