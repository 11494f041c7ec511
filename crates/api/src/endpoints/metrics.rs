//! Metrics endpoints for monitoring and observability.
//!
//! Provides endpoints for:
//! - Prometheus metrics export
//! - Health checks
//! - Vote engine counters

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use persona_common::metrics::{MetricsSnapshot, get_metrics};
use serde::Serialize;

use crate::middleware::AppState;

/// Create the metrics router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_metrics_json))
        .route("/prometheus", get(get_metrics_prometheus))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
}

/// JSON metrics response.
#[derive(Serialize)]
pub struct MetricsResponse {
    pub http: HttpMetrics,
    pub votes: VoteMetrics,
}

#[derive(Serialize)]
pub struct HttpMetrics {
    pub requests_total: u64,
    pub requests_active: u64,
    pub requests_2xx: u64,
    pub requests_4xx: u64,
    pub requests_5xx: u64,
    pub latency_avg_us: u64,
}

#[derive(Serialize)]
pub struct VoteMetrics {
    pub submitted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub removed: u64,
    pub duplicate: u64,
    pub tally_clamps: u64,
    pub tallies_repaired: u64,
}

impl From<MetricsSnapshot> for MetricsResponse {
    fn from(s: MetricsSnapshot) -> Self {
        Self {
            http: HttpMetrics {
                requests_total: s.http_requests_total,
                requests_active: s.http_requests_active,
                requests_2xx: s.http_requests_2xx,
                requests_4xx: s.http_requests_4xx,
                requests_5xx: s.http_requests_5xx,
                latency_avg_us: s.http_request_latency_avg_us,
            },
            votes: VoteMetrics {
                submitted: s.votes_submitted,
                updated: s.votes_updated,
                unchanged: s.votes_unchanged,
                removed: s.votes_removed,
                duplicate: s.votes_duplicate,
                tally_clamps: s.tally_clamps,
                tallies_repaired: s.tallies_repaired,
            },
        }
    }
}

/// Get metrics in JSON format.
async fn get_metrics_json() -> Json<MetricsResponse> {
    let snapshot = get_metrics().snapshot();
    Json(MetricsResponse::from(snapshot))
}

/// Get metrics in Prometheus text format.
async fn get_metrics_prometheus() -> Response {
    let prometheus_output = get_metrics().to_prometheus();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        prometheus_output,
    )
        .into_response()
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Simple health check (liveness probe).
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub database: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    pub latency_ms: Option<u64>,
}

/// Readiness check (readiness probe).
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let start = std::time::Instant::now();

    let database = match state.db.ping().await {
        Ok(()) => CheckResult {
            status: "ok".to_string(),
            latency_ms: Some(u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)),
        },
        Err(e) => CheckResult {
            status: format!("error: {e}"),
            latency_ms: None,
        },
    };

    let ready = database.status == "ok";
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(ReadinessResponse { ready, database }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(n: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            http_requests_total: n * 10,
            http_requests_active: n,
            http_requests_2xx: n * 8,
            http_requests_4xx: n,
            http_requests_5xx: n,
            http_request_latency_avg_us: n * 100,

            votes_submitted: n * 4,
            votes_updated: n * 2,
            votes_unchanged: n,
            votes_removed: n,
            votes_duplicate: n,
            tally_clamps: 0,
            tallies_repaired: n,
        }
    }

    #[test]
    fn test_metrics_response_from_snapshot() {
        let response = MetricsResponse::from(snapshot(5));

        assert_eq!(response.http.requests_total, 50);
        assert_eq!(response.http.latency_avg_us, 500);
        assert_eq!(response.votes.submitted, 20);
        assert_eq!(response.votes.tally_clamps, 0);
        assert_eq!(response.votes.tallies_repaired, 5);
    }

    #[test]
    fn test_metrics_response_from_zero_snapshot() {
        let response = MetricsResponse::from(snapshot(0));

        assert_eq!(response.http.latency_avg_us, 0);
        assert_eq!(response.votes.updated, 0);
    }
}
