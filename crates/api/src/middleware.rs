//! API middleware and shared state.

use std::sync::Arc;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use persona_common::{Timer, get_metrics};
use persona_core::{CommentService, VoteService, VoteStatsService};
use sea_orm::DatabaseConnection;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub comment_service: CommentService,
    pub vote_service: VoteService,
    pub vote_stats_service: VoteStatsService,
    /// Used by the readiness probe.
    pub db: Arc<DatabaseConnection>,
}

/// Count requests, responses by status class and latency.
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let metrics = get_metrics();
    let timer = Timer::start();
    metrics.start_request();

    let response = next.run(req).await;

    metrics.end_request();
    metrics.record_http_request(response.status().as_u16(), timer.elapsed());
    response
}
