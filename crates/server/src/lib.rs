//! HTTP server for resumable chunked uploads.
//!
//! This crate provides the HTTP surface over `splice-storage`:
//! - Existence checks with instant upload of published names
//! - Chunk upload into the staging area
//! - Merge into the public namespace and cancellation
//! - Static serving of published artifacts
//! - Background garbage collection of stale sessions

pub mod error;
pub mod gc;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
