//! Vote service.
//!
//! Submission and removal keep the vote record and the comment tally in one
//! database transaction. The tally is only ever moved by single-statement
//! increments and decrements, and the partial unique index on active votes
//! decides insert races.

use crate::catalog::{self, PersonalitySystem};
use crate::voter::VoterId;
use chrono::{DateTime, FixedOffset, Utc};
use persona_common::{AppError, AppResult, IdGenerator, VoteOutcomeKind, get_metrics};
use persona_db::{
    entities::vote,
    repositories::{CommentRepository, VoteRepository},
};
use sea_orm::{ConnectionTrait, DatabaseTransaction, Set, TransactionTrait};
use serde::Serialize;

/// A vote submission.
#[derive(Debug, Clone)]
pub struct SubmitVoteInput {
    pub comment_id: String,
    pub personality_system: String,
    pub personality_value: String,
    pub voter_identifier: String,
    /// Defaults to the comment's profile.
    pub profile_id: Option<String>,
}

/// What a submission did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitStatus {
    /// First vote in this system on this comment.
    Submitted,
    /// Existing vote moved to a different value.
    Updated,
    /// Existing vote already had this value; nothing was written.
    Unchanged,
}

impl SubmitStatus {
    /// Resubmissions count as updates, even when nothing changed.
    #[must_use]
    pub const fn is_update(self) -> bool {
        !matches!(self, Self::Submitted)
    }
}

impl From<SubmitStatus> for VoteOutcomeKind {
    fn from(status: SubmitStatus) -> Self {
        match status {
            SubmitStatus::Submitted => Self::Submitted,
            SubmitStatus::Updated => Self::Updated,
            SubmitStatus::Unchanged => Self::Unchanged,
        }
    }
}

/// Public projection of a vote. Never exposes the voter or the active flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicVote {
    pub id: String,
    pub comment_id: String,
    pub profile_id: String,
    pub personality_system: PersonalitySystem,
    pub personality_value: String,
    pub created_at: DateTime<FixedOffset>,
}

impl From<vote::Model> for PublicVote {
    fn from(v: vote::Model) -> Self {
        Self {
            id: v.id,
            comment_id: v.comment_id,
            profile_id: v.profile_id,
            personality_system: v.personality_system,
            personality_value: v.personality_value,
            created_at: v.created_at,
        }
    }
}

/// Result of a successful submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub status: SubmitStatus,
    pub is_update: bool,
    pub vote: PublicVote,
}

impl VoteOutcome {
    fn new(status: SubmitStatus, vote: vote::Model) -> Self {
        Self {
            status,
            is_update: status.is_update(),
            vote: vote.into(),
        }
    }
}

/// Per-item result of a bulk submission.
#[derive(Debug)]
pub struct BulkItemResult {
    pub index: usize,
    pub result: AppResult<VoteOutcome>,
}

/// Counts over a bulk submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Result of a bulk submission. Items never fail together.
#[derive(Debug)]
pub struct BulkOutcome {
    pub results: Vec<BulkItemResult>,
    pub summary: BulkSummary,
}

/// Vote service for business logic.
#[derive(Clone)]
pub struct VoteService {
    vote_repo: VoteRepository,
    comment_repo: CommentRepository,
    id_gen: IdGenerator,
}

impl VoteService {
    /// Create a new vote service.
    #[must_use]
    pub const fn new(vote_repo: VoteRepository, comment_repo: CommentRepository) -> Self {
        Self {
            vote_repo,
            comment_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Submit, change or confirm a vote.
    pub async fn submit(&self, input: SubmitVoteInput) -> AppResult<VoteOutcome> {
        let result = self.submit_inner(input).await;

        let metrics = get_metrics();
        match &result {
            Ok(outcome) => metrics.record_vote(outcome.status.into()),
            Err(AppError::DuplicateVote(_)) => metrics.record_vote(VoteOutcomeKind::Duplicate),
            Err(_) => {}
        }

        result
    }

    async fn submit_inner(&self, input: SubmitVoteInput) -> AppResult<VoteOutcome> {
        validate_comment_id(&input.comment_id)?;
        let (system, value) =
            catalog::resolve(&input.personality_system, &input.personality_value)?;
        let voter = VoterId::parse(&input.voter_identifier)?;

        let comment = self.comment_repo.get_by_id(&input.comment_id).await?;
        let profile_id = match input.profile_id {
            Some(profile_id) if profile_id != comment.profile_id => {
                return Err(AppError::Validation(format!(
                    "profileId: comment {} does not belong to profile {profile_id}",
                    comment.id
                )));
            }
            _ => comment.profile_id,
        };

        let txn = self.begin().await?;
        let existing =
            VoteRepository::find_active_for_update_in(&txn, &comment.id, voter.as_str(), system)
                .await?;

        let outcome = match existing {
            None => {
                let now = Utc::now();
                let model = vote::ActiveModel {
                    id: Set(self.id_gen.generate()),
                    comment_id: Set(comment.id.clone()),
                    profile_id: Set(profile_id),
                    voter_identifier: Set(voter.as_str().to_string()),
                    personality_system: Set(system),
                    personality_value: Set(value.to_string()),
                    active: Set(true),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                };

                let created = VoteRepository::create_in(&txn, model).await?;
                CommentRepository::increment_tally_in(&txn, &comment.id, system, value).await?;
                VoteOutcome::new(SubmitStatus::Submitted, created)
            }
            Some(current) if current.personality_value == value => {
                VoteOutcome::new(SubmitStatus::Unchanged, current)
            }
            Some(current) => {
                let updated = VoteRepository::update_value_in(
                    &txn,
                    &comment.id,
                    voter.as_str(),
                    system,
                    value,
                )
                .await?
                .ok_or_else(|| {
                    AppError::Internal("active vote disappeared inside transaction".to_string())
                })?;

                decrement_or_warn(&txn, &comment.id, system, &current.personality_value).await?;
                CommentRepository::increment_tally_in(&txn, &comment.id, system, value).await?;
                VoteOutcome::new(SubmitStatus::Updated, updated)
            }
        };

        commit(txn).await?;

        tracing::debug!(
            comment_id = %comment.id,
            system = %system,
            value = value,
            status = ?outcome.status,
            "Vote submitted"
        );

        Ok(outcome)
    }

    /// Withdraw a voter's vote in one system. `None` when there was nothing
    /// to remove.
    ///
    /// The comment itself is not looked up, so an unknown comment also yields
    /// `None` rather than `CommentNotFound`.
    pub async fn remove(
        &self,
        comment_id: &str,
        voter_identifier: &str,
        system: &str,
    ) -> AppResult<Option<PublicVote>> {
        validate_comment_id(comment_id)?;
        let system: PersonalitySystem = system
            .parse()
            .map_err(|e: String| AppError::Validation(format!("personalitySystem: {e}")))?;
        let voter = VoterId::parse(voter_identifier)?;

        let txn = self.begin().await?;
        let Some(removed) =
            VoteRepository::deactivate_in(&txn, comment_id, voter.as_str(), system).await?
        else {
            return Ok(None);
        };
        decrement_or_warn(&txn, comment_id, system, &removed.personality_value).await?;
        commit(txn).await?;

        get_metrics().record_vote(VoteOutcomeKind::Removed);
        tracing::debug!(comment_id = comment_id, system = %system, "Vote removed");

        Ok(Some(removed.into()))
    }

    /// Submit several votes, each on its own. Order of results matches input.
    pub async fn submit_bulk(&self, items: Vec<SubmitVoteInput>) -> BulkOutcome {
        let mut results = Vec::with_capacity(items.len());

        for (index, input) in items.into_iter().enumerate() {
            let result = self.submit(input).await;
            if let Err(ref e) = result {
                tracing::debug!(index = index, error = %e, "Bulk vote item failed");
            }
            results.push(BulkItemResult { index, result });
        }

        let succeeded = results.iter().filter(|r| r.result.is_ok()).count();
        let summary = BulkSummary {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        };

        BulkOutcome { results, summary }
    }

    /// Hard-delete a vote by ID (moderation). The tally is corrected when the
    /// vote was still active.
    pub async fn purge(&self, vote_id: &str) -> AppResult<PublicVote> {
        let txn = self.begin().await?;
        let deleted = VoteRepository::delete_by_id_in(&txn, vote_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Vote not found: {vote_id}")))?;

        if deleted.active {
            decrement_or_warn(
                &txn,
                &deleted.comment_id,
                deleted.personality_system,
                &deleted.personality_value,
            )
            .await?;
        }
        commit(txn).await?;

        tracing::info!(vote_id = vote_id, comment_id = %deleted.comment_id, "Vote purged");
        Ok(deleted.into())
    }

    async fn begin(&self) -> AppResult<DatabaseTransaction> {
        self.vote_repo
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::database("vote.begin", e))
    }
}

async fn commit(txn: DatabaseTransaction) -> AppResult<()> {
    txn.commit()
        .await
        .map_err(|e| AppError::database("vote.commit", e))
}

/// Decrement a tally counter, surfacing a clamp as a warning and a metric.
async fn decrement_or_warn<C: ConnectionTrait>(
    conn: &C,
    comment_id: &str,
    system: PersonalitySystem,
    value: &str,
) -> AppResult<()> {
    if !CommentRepository::decrement_tally_in(conn, comment_id, system, value).await? {
        get_metrics().record_tally_clamp();
        tracing::warn!(
            comment_id = comment_id,
            system = %system,
            value = value,
            "Tally decrement clamped at zero; tally and votes disagree"
        );
    }
    Ok(())
}

/// Reject anything that is not a comment ID this service could have issued.
pub fn validate_comment_id(comment_id: &str) -> AppResult<()> {
    if IdGenerator::is_well_formed(comment_id) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "commentId: '{comment_id}' is not a valid comment reference"
        )))
    }
}
