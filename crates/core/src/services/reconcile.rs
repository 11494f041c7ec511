//! Tally reconciliation.
//!
//! The tally is a cache of the active votes. Normal writes keep it exact, but
//! anything outside the vote service (manual SQL, a restore) can leave it
//! stale. This recomputes it from the votes and overwrites it when it differs.

use std::time::Duration;

use crate::tally::VoteTally;
use persona_common::{AppError, AppResult, get_metrics};
use persona_db::repositories::{CommentRepository, VoteRepository};
use sea_orm::TransactionTrait;

/// Totals from a reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: u64,
    pub repaired: u64,
}

/// Recomputes comment tallies from active votes.
#[derive(Clone)]
pub struct TallyReconciler {
    comment_repo: CommentRepository,
    batch_size: u64,
}

impl TallyReconciler {
    /// Create a reconciler that walks comments `batch_size` at a time.
    #[must_use]
    pub fn new(comment_repo: CommentRepository, batch_size: u64) -> Self {
        Self {
            comment_repo,
            batch_size: batch_size.max(1),
        }
    }

    /// Repair one comment's tally. Returns whether it had to be rewritten.
    ///
    /// The comment row stays locked while its votes are counted, so vote
    /// writes on it wait rather than race the overwrite.
    pub async fn reconcile_comment(&self, comment_id: &str) -> AppResult<bool> {
        let txn = self
            .comment_repo
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::database("reconcile.begin", e))?;

        let comment = CommentRepository::lock_in(&txn, comment_id)
            .await?
            .ok_or_else(|| AppError::CommentNotFound(comment_id.to_string()))?;

        let stored = VoteTally::from_comment(&comment);
        let actual =
            VoteTally::from_rows(VoteRepository::system_stats_in(&txn, Some(comment_id)).await?);

        if stored.same_counts(&actual) {
            return Ok(false);
        }

        let total = i32::try_from(actual.total_votes).map_err(|_| {
            AppError::Internal(format!("vote total overflows for comment {comment_id}"))
        })?;
        CommentRepository::replace_tally_in(&txn, comment_id, actual.stats_json(), total).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::database("reconcile.commit", e))?;

        get_metrics().record_tally_repaired();
        tracing::warn!(
            comment_id = comment_id,
            stored_total = stored.total_votes,
            actual_total = actual.total_votes,
            "Repaired drifted comment tally"
        );

        Ok(true)
    }

    /// Check every comment, in ID order.
    ///
    /// A failure on one comment is logged and does not stop the pass.
    pub async fn reconcile_all(&self) -> AppResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let mut after: Option<String> = None;

        loop {
            let batch = self
                .comment_repo
                .find_after(after.as_deref(), self.batch_size)
                .await?;
            let Some(last) = batch.last() else {
                break;
            };
            after = Some(last.id.clone());

            for comment in &batch {
                report.checked += 1;
                match self.reconcile_comment(&comment.id).await {
                    Ok(true) => report.repaired += 1,
                    Ok(false) => {}
                    // Deleted since the batch was read.
                    Err(AppError::CommentNotFound(_)) => {}
                    Err(e) => {
                        tracing::error!(comment_id = %comment.id, error = %e, "Tally reconciliation failed");
                    }
                }
            }

            if (batch.len() as u64) < self.batch_size {
                break;
            }
        }

        tracing::info!(
            checked = report.checked,
            repaired = report.repaired,
            "Tally reconciliation finished"
        );
        Ok(report)
    }

    /// Run [`reconcile_all`](Self::reconcile_all) every `interval` until the
    /// task is dropped.
    pub async fn run_periodic(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = self.reconcile_all().await {
                tracing::error!(error = %e, "Periodic tally reconciliation failed");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use persona_db::entities::comment;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    const COMMENT_ID: &str = "01hzx3k5m9n8p7q6r5s4t3v2w1";

    fn test_comment(id: &str, vote_stats: serde_json::Value, total: i32) -> comment::Model {
        comment::Model {
            id: id.to_string(),
            profile_id: "profile1".to_string(),
            author: "tester".to_string(),
            title: None,
            content: "content".to_string(),
            vote_stats,
            total_votes: total,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn stats_row(system: &str, value: &str, count: i64) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([
            ("personality_system", Value::from(system)),
            ("personality_value", Value::from(value)),
            ("vote_count", Value::BigInt(Some(count))),
        ])
    }

    fn reconciler(db: MockDatabase, batch_size: u64) -> TallyReconciler {
        TallyReconciler::new(CommentRepository::new(Arc::new(db.into_connection())), batch_size)
    }

    #[tokio::test]
    async fn test_consistent_tally_is_left_alone() {
        // No exec results: an overwrite would fail the mock.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[test_comment(
                COMMENT_ID,
                json!({"mbti": {"INTJ": 0, "ENFP": 1}}),
                1,
            )]])
            .append_query_results([[stats_row("mbti", "ENFP", 1)]]);

        let repaired = reconciler(db, 10).reconcile_comment(COMMENT_ID).await.unwrap();

        assert!(!repaired);
    }

    #[tokio::test]
    async fn test_drifted_tally_is_rewritten() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[test_comment(COMMENT_ID, json!({"mbti": {"ENFP": 3}}), 5)]])
            .append_query_results([[stats_row("mbti", "ENFP", 2)]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }]);

        let repaired = reconciler(db, 10).reconcile_comment(COMMENT_ID).await.unwrap();

        assert!(repaired);
    }

    #[tokio::test]
    async fn test_missing_comment() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<comment::Model>::new()]);

        let result = reconciler(db, 10).reconcile_comment(COMMENT_ID).await;

        assert!(matches!(result, Err(AppError::CommentNotFound(_))));
    }

    #[tokio::test]
    async fn test_reconcile_all_walks_batches() {
        let first = "01hzx3k5m9n8p7q6r5s4t3v2w1";
        let second = "01hzx3k5m9n8p7q6r5s4t3v2w2";
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            // batch 1 (full, so another batch is fetched)
            .append_query_results([[test_comment(first, json!({}), 0)]])
            .append_query_results([[test_comment(first, json!({}), 0)]])
            .append_query_results([Vec::<BTreeMap<&'static str, Value>>::new()])
            // batch 2
            .append_query_results([[test_comment(second, json!({}), 1)]])
            .append_query_results([[test_comment(second, json!({}), 1)]])
            .append_query_results([Vec::<BTreeMap<&'static str, Value>>::new()])
            // batch 3 is empty and ends the walk
            .append_query_results([Vec::<comment::Model>::new()])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }]);

        let report = reconciler(db, 1).reconcile_all().await.unwrap();

        assert_eq!(report.checked, 2);
        assert_eq!(report.repaired, 1);
    }
}
