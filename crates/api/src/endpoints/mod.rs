//! API endpoints.

mod comments;
mod metrics;
mod votes;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/comments", comments::router())
        .nest("/votes", votes::router())
        .nest("/metrics", metrics::router())
}
