#![deny(missing_docs)]
//! HTTP transport adapter for Teledex.

/// API error mapping.
pub mod error;
/// Route handlers.
pub mod routes;
/// HTTP runtime entrypoint.
pub mod runner;
/// Router assembly and listener.
pub mod server;
/// Shared handler state.
pub mod state;

pub use error::ApiError;
pub use server::build_router;
pub use state::AppState;
