//! HTTP API layer for persona-rs.
//!
//! - **Endpoints**: comments, votes, statistics and metrics
//! - **Extractors**: anonymous voter identity
//! - **Middleware**: request metrics
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;
