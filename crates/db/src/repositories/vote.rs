//! Vote repository.
//!
//! All mutations are single statements so concurrent voters on the same
//! comment never overwrite each other's records. The `*_in` variants take any
//! connection so they can run inside a caller-owned transaction.

use std::sync::Arc;

use crate::entities::{
    Vote,
    vote::{self, PersonalitySystem},
};
use chrono::Utc;
use persona_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr,
    sea_query::Expr,
};

/// Filter for vote listing and counting queries. Only active votes are ever
/// matched.
#[derive(Debug, Clone, Default)]
pub struct VoteFilter {
    pub comment_id: Option<String>,
    pub voter_identifier: Option<String>,
    pub system: Option<PersonalitySystem>,
}

impl VoteFilter {
    fn condition(&self) -> Condition {
        let mut condition = Condition::all().add(vote::Column::Active.eq(true));

        if let Some(ref comment_id) = self.comment_id {
            condition = condition.add(vote::Column::CommentId.eq(comment_id.as_str()));
        }
        if let Some(ref voter) = self.voter_identifier {
            condition = condition.add(vote::Column::VoterIdentifier.eq(voter.as_str()));
        }
        if let Some(system) = self.system {
            condition = condition.add(vote::Column::PersonalitySystem.eq(system));
        }

        condition
    }
}

/// Vote repository for database operations.
#[derive(Clone)]
pub struct VoteRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteRepository {
    /// Create a new vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Underlying connection, for opening transactions.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    // ==================== Writes ====================

    /// Insert a vote.
    ///
    /// Fails with [`AppError::DuplicateVote`] when another active vote for the
    /// same (comment, voter, system) already exists.
    pub async fn create_in<C: ConnectionTrait>(
        conn: &C,
        model: vote::ActiveModel,
    ) -> AppResult<vote::Model> {
        model.insert(conn).await.map_err(map_insert_error)
    }

    /// Find the active vote for a (comment, voter, system) triple.
    pub async fn find_active_in<C: ConnectionTrait>(
        conn: &C,
        comment_id: &str,
        voter_identifier: &str,
        system: PersonalitySystem,
    ) -> AppResult<Option<vote::Model>> {
        Vote::find()
            .filter(active_triple(comment_id, voter_identifier, system))
            .one(conn)
            .await
            .map_err(|e| AppError::database("vote.find_active", e))
    }

    /// Find the active vote for a triple and lock its row until the
    /// transaction ends.
    ///
    /// A concurrent writer on the same vote blocks here and then sees the
    /// committed value, so the value it decrements is the one the tally holds.
    pub async fn find_active_for_update_in<C: ConnectionTrait>(
        conn: &C,
        comment_id: &str,
        voter_identifier: &str,
        system: PersonalitySystem,
    ) -> AppResult<Option<vote::Model>> {
        Vote::find()
            .filter(active_triple(comment_id, voter_identifier, system))
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(|e| AppError::database("vote.find_active_for_update", e))
    }

    /// Change the value of the active vote, returning the updated record.
    pub async fn update_value_in<C: ConnectionTrait>(
        conn: &C,
        comment_id: &str,
        voter_identifier: &str,
        system: PersonalitySystem,
        new_value: &str,
    ) -> AppResult<Option<vote::Model>> {
        let updated = Vote::update_many()
            .col_expr(vote::Column::PersonalityValue, Expr::value(new_value))
            .col_expr(
                vote::Column::UpdatedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(active_triple(comment_id, voter_identifier, system))
            .exec_with_returning(conn)
            .await
            .map_err(|e| AppError::database("vote.update_value", e))?;

        Ok(updated.into_iter().next())
    }

    /// Soft-delete the active vote.
    ///
    /// The returned record is the one that was deactivated; its
    /// `personality_value` is the value the tally counted for it.
    pub async fn deactivate_in<C: ConnectionTrait>(
        conn: &C,
        comment_id: &str,
        voter_identifier: &str,
        system: PersonalitySystem,
    ) -> AppResult<Option<vote::Model>> {
        let deactivated = Vote::update_many()
            .col_expr(vote::Column::Active, Expr::value(false))
            .col_expr(
                vote::Column::UpdatedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(active_triple(comment_id, voter_identifier, system))
            .exec_with_returning(conn)
            .await
            .map_err(|e| AppError::database("vote.deactivate", e))?;

        Ok(deactivated.into_iter().next())
    }

    /// Hard-delete a vote by ID, returning the removed record.
    ///
    /// Administrative path; the caller is responsible for the tally.
    pub async fn delete_by_id_in<C: ConnectionTrait>(
        conn: &C,
        id: &str,
    ) -> AppResult<Option<vote::Model>> {
        let Some(existing) = Vote::find_by_id(id)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(|e| AppError::database("vote.delete_by_id", e))?
        else {
            return Ok(None);
        };

        Vote::delete_by_id(id)
            .exec(conn)
            .await
            .map_err(|e| AppError::database("vote.delete_by_id", e))?;

        Ok(Some(existing))
    }

    /// Find the active vote for a triple outside a transaction.
    pub async fn find_active_vote(
        &self,
        comment_id: &str,
        voter_identifier: &str,
        system: PersonalitySystem,
    ) -> AppResult<Option<vote::Model>> {
        Self::find_active_in(self.db.as_ref(), comment_id, voter_identifier, system).await
    }

    /// Insert a vote outside a transaction.
    pub async fn create(&self, model: vote::ActiveModel) -> AppResult<vote::Model> {
        Self::create_in(self.db.as_ref(), model).await
    }

    /// Change a vote's value outside a transaction.
    pub async fn update_value(
        &self,
        comment_id: &str,
        voter_identifier: &str,
        system: PersonalitySystem,
        new_value: &str,
    ) -> AppResult<Option<vote::Model>> {
        Self::update_value_in(self.db.as_ref(), comment_id, voter_identifier, system, new_value)
            .await
    }

    /// Deactivate a vote outside a transaction.
    pub async fn deactivate(
        &self,
        comment_id: &str,
        voter_identifier: &str,
        system: PersonalitySystem,
    ) -> AppResult<Option<vote::Model>> {
        Self::deactivate_in(self.db.as_ref(), comment_id, voter_identifier, system).await
    }

    /// Hard-delete a vote outside a transaction.
    pub async fn delete_by_id(&self, id: &str) -> AppResult<Option<vote::Model>> {
        Self::delete_by_id_in(self.db.as_ref(), id).await
    }

    // ==================== Reads ====================

    /// Get active votes on a comment (paginated, newest first).
    pub async fn find_by_comment(
        &self,
        comment_id: &str,
        system: Option<PersonalitySystem>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<vote::Model>> {
        let filter = VoteFilter {
            comment_id: Some(comment_id.to_string()),
            system,
            ..Default::default()
        };

        Vote::find()
            .filter(filter.condition())
            .order_by_desc(vote::Column::CreatedAt)
            .order_by_desc(vote::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::database("vote.find_by_comment", e))
    }

    /// Get a voter's active votes (paginated).
    pub async fn find_by_voter(
        &self,
        voter_identifier: &str,
        system: Option<PersonalitySystem>,
        limit: u64,
        offset: u64,
        newest_first: bool,
    ) -> AppResult<Vec<vote::Model>> {
        let filter = VoteFilter {
            voter_identifier: Some(voter_identifier.to_string()),
            system,
            ..Default::default()
        };
        let order = if newest_first { Order::Desc } else { Order::Asc };

        Vote::find()
            .filter(filter.condition())
            .order_by(vote::Column::CreatedAt, order.clone())
            .order_by(vote::Column::Id, order)
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::database("vote.find_by_voter", e))
    }

    /// Count active votes matching a filter.
    pub async fn count_active(&self, filter: &VoteFilter) -> AppResult<u64> {
        Vote::find()
            .filter(filter.condition())
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::database("vote.count_active", e))
    }

    /// Comments with the most active votes, as `(comment_id, count)`.
    ///
    /// Ties are broken by comment ID ascending.
    pub async fn top_comments(
        &self,
        system: Option<PersonalitySystem>,
        limit: u64,
    ) -> AppResult<Vec<(String, i64)>> {
        let filter = VoteFilter {
            system,
            ..Default::default()
        };

        Vote::find()
            .select_only()
            .column(vote::Column::CommentId)
            .column_as(Expr::col(vote::Column::Id).count(), "vote_count")
            .filter(filter.condition())
            .group_by(vote::Column::CommentId)
            .order_by(Expr::col(vote::Column::Id).count(), Order::Desc)
            .order_by_asc(vote::Column::CommentId)
            .limit(limit)
            .into_tuple::<(String, i64)>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::database("vote.top_comments", e))
    }

    /// Active vote counts grouped by `(system, value)`, optionally for one comment.
    pub async fn system_stats_in<C: ConnectionTrait>(
        conn: &C,
        comment_id: Option<&str>,
    ) -> AppResult<Vec<(PersonalitySystem, String, i64)>> {
        let filter = VoteFilter {
            comment_id: comment_id.map(str::to_string),
            ..Default::default()
        };

        let rows = Vote::find()
            .select_only()
            .column(vote::Column::PersonalitySystem)
            .column(vote::Column::PersonalityValue)
            .column_as(Expr::col(vote::Column::Id).count(), "vote_count")
            .filter(filter.condition())
            .group_by(vote::Column::PersonalitySystem)
            .group_by(vote::Column::PersonalityValue)
            .order_by_asc(vote::Column::PersonalitySystem)
            .order_by_asc(vote::Column::PersonalityValue)
            .into_tuple::<(String, String, i64)>()
            .all(conn)
            .await
            .map_err(|e| AppError::database("vote.system_stats", e))?;

        Ok(rows
            .into_iter()
            .filter_map(|(system, value, count)| match system.parse() {
                Ok(system) => Some((system, value, count)),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping vote row with unknown system");
                    None
                }
            })
            .collect())
    }

    /// Active vote counts grouped by `(system, value)` outside a transaction.
    pub async fn system_stats(
        &self,
        comment_id: Option<&str>,
    ) -> AppResult<Vec<(PersonalitySystem, String, i64)>> {
        Self::system_stats_in(self.db.as_ref(), comment_id).await
    }
}

/// Condition matching the single active vote for a triple.
fn active_triple(
    comment_id: &str,
    voter_identifier: &str,
    system: PersonalitySystem,
) -> Condition {
    VoteFilter {
        comment_id: Some(comment_id.to_string()),
        voter_identifier: Some(voter_identifier.to_string()),
        system: Some(system),
    }
    .condition()
}

/// Map an insert failure, separating unique-index races from other errors.
fn map_insert_error(err: DbErr) -> AppError {
    let unique_violation = matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        || err.to_string().contains("duplicate key value");

    if unique_violation {
        AppError::DuplicateVote(
            "an active vote already exists for this comment and personality system".to_string(),
        )
    } else {
        AppError::database("vote.create", err)
    }
}
