//! Comment repository.

use std::sync::Arc;

use crate::entities::{Comment, comment, vote::PersonalitySystem};
use persona_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Statement, sea_query::Expr,
};

/// Adds one to `vote_stats[$1][$2]` and `total_votes` in a single statement.
///
/// The outer `jsonb_set` needs the system object to exist, so the inner one
/// creates it when missing.
const INCREMENT_TALLY_SQL: &str = r"
    UPDATE comment
    SET vote_stats = jsonb_set(
            jsonb_set(
                COALESCE(vote_stats, '{}'::jsonb),
                ARRAY[$1::text],
                COALESCE(vote_stats -> $1::text, '{}'::jsonb)
            ),
            ARRAY[$1::text, $2::text],
            to_jsonb(COALESCE((vote_stats -> $1::text ->> $2::text)::bigint, 0) + 1)
        ),
        total_votes = total_votes + 1
    WHERE id = $3
";

/// Subtracts one from `vote_stats[$1][$2]` and `total_votes`, but only when
/// the counter is positive. Zero rows affected means the decrement clamped.
const DECREMENT_TALLY_SQL: &str = r"
    UPDATE comment
    SET vote_stats = jsonb_set(
            vote_stats,
            ARRAY[$1::text, $2::text],
            to_jsonb((vote_stats -> $1::text ->> $2::text)::bigint - 1)
        ),
        total_votes = GREATEST(total_votes - 1, 0)
    WHERE id = $3
        AND COALESCE((vote_stats -> $1::text ->> $2::text)::bigint, 0) > 0
";

/// Comment repository for database operations.
#[derive(Clone)]
pub struct CommentRepository {
    db: Arc<DatabaseConnection>,
}

impl CommentRepository {
    /// Create a new comment repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Underlying connection, for opening transactions.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    /// Find a comment by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<comment::Model>> {
        Comment::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::database("comment.find_by_id", e))
    }

    /// Find a comment by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<comment::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::CommentNotFound(id.to_string()))
    }

    /// Find comments by IDs.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<comment::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        Comment::find()
            .filter(comment::Column::Id.is_in(ids.to_vec()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::database("comment.find_by_ids", e))
    }

    /// Get comments in ID order, starting after `after_id` (keyset pagination).
    pub async fn find_after(
        &self,
        after_id: Option<&str>,
        limit: u64,
    ) -> AppResult<Vec<comment::Model>> {
        let mut query = Comment::find().order_by_asc(comment::Column::Id);

        if let Some(id) = after_id {
            query = query.filter(comment::Column::Id.gt(id));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::database("comment.find_after", e))
    }

    /// Create a new comment.
    pub async fn create(&self, model: comment::ActiveModel) -> AppResult<comment::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::database("comment.create", e))
    }

    // ==================== Tally ====================

    /// Load a comment and hold its row lock until the surrounding transaction ends.
    pub async fn lock_in<C: ConnectionTrait>(
        conn: &C,
        id: &str,
    ) -> AppResult<Option<comment::Model>> {
        Comment::find_by_id(id)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(|e| AppError::database("comment.lock", e))
    }

    /// Increment one tally counter atomically (single UPDATE query, no fetch).
    pub async fn increment_tally_in<C: ConnectionTrait>(
        conn: &C,
        comment_id: &str,
        system: PersonalitySystem,
        value: &str,
    ) -> AppResult<()> {
        let result = conn
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                INCREMENT_TALLY_SQL,
                [system.as_str().into(), value.into(), comment_id.into()],
            ))
            .await
            .map_err(|e| AppError::database("comment.increment_tally", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::CommentNotFound(comment_id.to_string()));
        }
        Ok(())
    }

    /// Decrement one tally counter atomically, never below zero.
    ///
    /// Returns `false` when the counter was already zero (or the comment is
    /// gone) and nothing was changed.
    pub async fn decrement_tally_in<C: ConnectionTrait>(
        conn: &C,
        comment_id: &str,
        system: PersonalitySystem,
        value: &str,
    ) -> AppResult<bool> {
        let result = conn
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                DECREMENT_TALLY_SQL,
                [system.as_str().into(), value.into(), comment_id.into()],
            ))
            .await
            .map_err(|e| AppError::database("comment.decrement_tally", e))?;

        Ok(result.rows_affected() > 0)
    }

    /// Overwrite a comment's tally (reconciliation only).
    pub async fn replace_tally_in<C: ConnectionTrait>(
        conn: &C,
        comment_id: &str,
        vote_stats: serde_json::Value,
        total_votes: i32,
    ) -> AppResult<()> {
        Comment::update_many()
            .col_expr(comment::Column::VoteStats, Expr::value(vote_stats))
            .col_expr(comment::Column::TotalVotes, Expr::value(total_votes))
            .filter(comment::Column::Id.eq(comment_id))
            .exec(conn)
            .await
            .map_err(|e| AppError::database("comment.replace_tally", e))?;
        Ok(())
    }

    /// Increment one tally counter outside a transaction.
    pub async fn increment_tally(
        &self,
        comment_id: &str,
        system: PersonalitySystem,
        value: &str,
    ) -> AppResult<()> {
        Self::increment_tally_in(self.db.as_ref(), comment_id, system, value).await
    }

    /// Decrement one tally counter outside a transaction.
    pub async fn decrement_tally(
        &self,
        comment_id: &str,
        system: PersonalitySystem,
        value: &str,
    ) -> AppResult<bool> {
        Self::decrement_tally_in(self.db.as_ref(), comment_id, system, value).await
    }
}
