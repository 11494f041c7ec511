//! Metrics collection for persona-rs.
//!
//! Provides application-level counters for request traffic and for the
//! vote engine, so that tally drift and submission races are observable.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Global metrics instance.
static METRICS: std::sync::OnceLock<Arc<Metrics>> = std::sync::OnceLock::new();

/// Get the global metrics instance.
pub fn get_metrics() -> &'static Arc<Metrics> {
    METRICS.get_or_init(|| Arc::new(Metrics::new()))
}

/// Application metrics collector.
#[derive(Debug)]
pub struct Metrics {
    // === Request Metrics ===
    /// Total HTTP requests received
    pub http_requests_total: AtomicU64,
    /// Active HTTP requests
    pub http_requests_active: AtomicU64,
    /// HTTP requests by status code category (2xx, 4xx, 5xx)
    pub http_requests_2xx: AtomicU64,
    pub http_requests_4xx: AtomicU64,
    pub http_requests_5xx: AtomicU64,
    /// Total request latency in microseconds
    pub http_request_latency_us_total: AtomicU64,
    /// Request count for average calculation
    pub http_request_latency_count: AtomicU64,

    // === Vote Metrics ===
    /// First votes cast for a (comment, voter, system) slot
    pub votes_submitted: AtomicU64,
    /// Votes whose value changed
    pub votes_updated: AtomicU64,
    /// Resubmissions with an identical value
    pub votes_unchanged: AtomicU64,
    /// Votes deactivated
    pub votes_removed: AtomicU64,
    /// Inserts that lost the uniqueness race
    pub votes_duplicate: AtomicU64,
    /// Decrements that hit a zero counter
    pub tally_clamps: AtomicU64,
    /// Comment tallies rewritten by reconciliation
    pub tallies_repaired: AtomicU64,
}

impl Metrics {
    /// Create a new metrics instance with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            http_requests_total: AtomicU64::new(0),
            http_requests_active: AtomicU64::new(0),
            http_requests_2xx: AtomicU64::new(0),
            http_requests_4xx: AtomicU64::new(0),
            http_requests_5xx: AtomicU64::new(0),
            http_request_latency_us_total: AtomicU64::new(0),
            http_request_latency_count: AtomicU64::new(0),

            votes_submitted: AtomicU64::new(0),
            votes_updated: AtomicU64::new(0),
            votes_unchanged: AtomicU64::new(0),
            votes_removed: AtomicU64::new(0),
            votes_duplicate: AtomicU64::new(0),
            tally_clamps: AtomicU64::new(0),
            tallies_repaired: AtomicU64::new(0),
        }
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, status_code: u16, latency: Duration) {
        self.http_requests_total.fetch_add(1, Ordering::Relaxed);

        match status_code {
            200..=299 => self.http_requests_2xx.fetch_add(1, Ordering::Relaxed),
            400..=499 => self.http_requests_4xx.fetch_add(1, Ordering::Relaxed),
            500..=599 => self.http_requests_5xx.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };

        self.http_request_latency_us_total
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.http_request_latency_count
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Start tracking an active request.
    pub fn start_request(&self) {
        self.http_requests_active.fetch_add(1, Ordering::Relaxed);
    }

    /// End tracking an active request.
    pub fn end_request(&self) {
        self.http_requests_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record the outcome of a vote submission.
    pub fn record_vote(&self, outcome: VoteOutcomeKind) {
        let counter = match outcome {
            VoteOutcomeKind::Submitted => &self.votes_submitted,
            VoteOutcomeKind::Updated => &self.votes_updated,
            VoteOutcomeKind::Unchanged => &self.votes_unchanged,
            VoteOutcomeKind::Removed => &self.votes_removed,
            VoteOutcomeKind::Duplicate => &self.votes_duplicate,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a decrement that found the counter already at zero.
    pub fn record_tally_clamp(&self) {
        self.tally_clamps.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a tally rewritten by reconciliation.
    pub fn record_tally_repaired(&self) {
        self.tallies_repaired.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            http_requests_total: self.http_requests_total.load(Ordering::Relaxed),
            http_requests_active: self.http_requests_active.load(Ordering::Relaxed),
            http_requests_2xx: self.http_requests_2xx.load(Ordering::Relaxed),
            http_requests_4xx: self.http_requests_4xx.load(Ordering::Relaxed),
            http_requests_5xx: self.http_requests_5xx.load(Ordering::Relaxed),
            http_request_latency_avg_us: self.average_latency_us(),

            votes_submitted: self.votes_submitted.load(Ordering::Relaxed),
            votes_updated: self.votes_updated.load(Ordering::Relaxed),
            votes_unchanged: self.votes_unchanged.load(Ordering::Relaxed),
            votes_removed: self.votes_removed.load(Ordering::Relaxed),
            votes_duplicate: self.votes_duplicate.load(Ordering::Relaxed),
            tally_clamps: self.tally_clamps.load(Ordering::Relaxed),
            tallies_repaired: self.tallies_repaired.load(Ordering::Relaxed),
        }
    }

    /// Calculate average HTTP request latency.
    fn average_latency_us(&self) -> u64 {
        let total = self.http_request_latency_us_total.load(Ordering::Relaxed);
        let count = self.http_request_latency_count.load(Ordering::Relaxed);
        if count > 0 {
            total / count
        } else {
            0
        }
    }

    /// Export metrics in Prometheus format.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut output = String::new();

        // HTTP metrics
        output.push_str("# HELP persona_http_requests_total Total HTTP requests\n");
        output.push_str("# TYPE persona_http_requests_total counter\n");
        output.push_str(&format!(
            "persona_http_requests_total {}\n",
            snapshot.http_requests_total
        ));

        output.push_str("# HELP persona_http_requests_active Active HTTP requests\n");
        output.push_str("# TYPE persona_http_requests_active gauge\n");
        output.push_str(&format!(
            "persona_http_requests_active {}\n",
            snapshot.http_requests_active
        ));

        output.push_str("# HELP persona_http_requests_by_status HTTP requests by status\n");
        output.push_str("# TYPE persona_http_requests_by_status counter\n");
        output.push_str(&format!(
            "persona_http_requests_by_status{{status=\"2xx\"}} {}\n",
            snapshot.http_requests_2xx
        ));
        output.push_str(&format!(
            "persona_http_requests_by_status{{status=\"4xx\"}} {}\n",
            snapshot.http_requests_4xx
        ));
        output.push_str(&format!(
            "persona_http_requests_by_status{{status=\"5xx\"}} {}\n",
            snapshot.http_requests_5xx
        ));

        output.push_str("# HELP persona_http_request_latency_avg_us Average request latency\n");
        output.push_str("# TYPE persona_http_request_latency_avg_us gauge\n");
        output.push_str(&format!(
            "persona_http_request_latency_avg_us {}\n",
            snapshot.http_request_latency_avg_us
        ));

        // Vote metrics
        output.push_str("# HELP persona_votes_total Vote operations by outcome\n");
        output.push_str("# TYPE persona_votes_total counter\n");
        for (outcome, value) in [
            ("submitted", snapshot.votes_submitted),
            ("updated", snapshot.votes_updated),
            ("unchanged", snapshot.votes_unchanged),
            ("removed", snapshot.votes_removed),
            ("duplicate", snapshot.votes_duplicate),
        ] {
            output.push_str(&format!(
                "persona_votes_total{{outcome=\"{outcome}\"}} {value}\n"
            ));
        }

        output.push_str("# HELP persona_tally_clamps_total Decrements that hit zero\n");
        output.push_str("# TYPE persona_tally_clamps_total counter\n");
        output.push_str(&format!(
            "persona_tally_clamps_total {}\n",
            snapshot.tally_clamps
        ));

        output.push_str("# HELP persona_tallies_repaired_total Tallies rewritten by reconciliation\n");
        output.push_str("# TYPE persona_tallies_repaired_total counter\n");
        output.push_str(&format!(
            "persona_tallies_repaired_total {}\n",
            snapshot.tallies_repaired
        ));

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Vote operation outcome, as counted by [`Metrics::record_vote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcomeKind {
    Submitted,
    Updated,
    Unchanged,
    Removed,
    Duplicate,
}

/// Snapshot of all metrics at a point in time.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    // HTTP
    pub http_requests_total: u64,
    pub http_requests_active: u64,
    pub http_requests_2xx: u64,
    pub http_requests_4xx: u64,
    pub http_requests_5xx: u64,
    pub http_request_latency_avg_us: u64,

    // Votes
    pub votes_submitted: u64,
    pub votes_updated: u64,
    pub votes_unchanged: u64,
    pub votes_removed: u64,
    pub votes_duplicate: u64,
    pub tally_clamps: u64,
    pub tallies_repaired: u64,
}

/// Timer guard for measuring operation duration.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.http_requests_total.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.votes_submitted.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_http_request() {
        let metrics = Metrics::new();

        metrics.record_http_request(200, Duration::from_millis(50));
        metrics.record_http_request(404, Duration::from_millis(10));
        metrics.record_http_request(500, Duration::from_millis(100));

        assert_eq!(metrics.http_requests_total.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.http_requests_2xx.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.http_requests_4xx.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.http_requests_5xx.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_active_request_tracking() {
        let metrics = Metrics::new();

        metrics.start_request();
        metrics.start_request();
        assert_eq!(metrics.http_requests_active.load(Ordering::Relaxed), 2);

        metrics.end_request();
        assert_eq!(metrics.http_requests_active.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_record_vote_outcomes() {
        let metrics = Metrics::new();

        metrics.record_vote(VoteOutcomeKind::Submitted);
        metrics.record_vote(VoteOutcomeKind::Submitted);
        metrics.record_vote(VoteOutcomeKind::Updated);
        metrics.record_vote(VoteOutcomeKind::Duplicate);
        metrics.record_tally_clamp();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.votes_submitted, 2);
        assert_eq!(snapshot.votes_updated, 1);
        assert_eq!(snapshot.votes_unchanged, 0);
        assert_eq!(snapshot.votes_duplicate, 1);
        assert_eq!(snapshot.tally_clamps, 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.record_http_request(200, Duration::from_millis(50));
        metrics.record_vote(VoteOutcomeKind::Removed);

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("persona_http_requests_total 1"));
        assert!(prometheus.contains("persona_http_requests_by_status{status=\"2xx\"} 1"));
        assert!(prometheus.contains("persona_votes_total{outcome=\"removed\"} 1"));
        assert!(prometheus.contains("persona_tally_clamps_total 0"));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(Duration::from_millis(10));
        let elapsed = timer.elapsed();
        assert!(elapsed >= Duration::from_millis(10));
    }

    #[test]
    fn test_average_latency() {
        let metrics = Metrics::new();
        assert_eq!(metrics.average_latency_us(), 0);
        metrics.record_http_request(200, Duration::from_micros(100));
        metrics.record_http_request(200, Duration::from_micros(200));
        assert_eq!(metrics.average_latency_us(), 150);
    }
}
