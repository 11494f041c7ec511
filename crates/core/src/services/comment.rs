//! Comment service.
//!
//! Only what the vote engine needs from comments: creating one with an empty
//! tally, loading it, and loading display summaries in bulk.

use std::collections::HashMap;

use crate::tally::VoteTally;
use chrono::{DateTime, FixedOffset, Utc};
use persona_common::{AppError, AppResult, IdGenerator};
use persona_db::{entities::comment, repositories::CommentRepository};
use sea_orm::Set;
use serde::Serialize;

/// Input for creating a comment.
#[derive(Debug, Clone)]
pub struct CreateCommentInput {
    pub profile_id: String,
    pub author: String,
    pub title: Option<String>,
    pub content: String,
}

/// Minimal comment projection shown next to votes and rankings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSummary {
    pub id: String,
    pub profile_id: String,
    pub author: String,
    pub title: Option<String>,
    pub created_at: DateTime<FixedOffset>,
}

impl From<&comment::Model> for CommentSummary {
    fn from(c: &comment::Model) -> Self {
        Self {
            id: c.id.clone(),
            profile_id: c.profile_id.clone(),
            author: c.author.clone(),
            title: c.title.clone(),
            created_at: c.created_at,
        }
    }
}

/// Comment service for business logic.
#[derive(Clone)]
pub struct CommentService {
    comment_repo: CommentRepository,
    id_gen: IdGenerator,
}

impl CommentService {
    /// Create a new comment service.
    #[must_use]
    pub const fn new(comment_repo: CommentRepository) -> Self {
        Self {
            comment_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a comment with an all-zero tally.
    pub async fn create(&self, input: CreateCommentInput) -> AppResult<comment::Model> {
        if input.content.trim().is_empty() {
            return Err(AppError::Validation(
                "content: must not be empty".to_string(),
            ));
        }

        let model = comment::ActiveModel {
            id: Set(self.id_gen.generate()),
            profile_id: Set(input.profile_id),
            author: Set(input.author),
            title: Set(input.title.filter(|t| !t.trim().is_empty())),
            content: Set(input.content),
            vote_stats: Set(VoteTally::default().stats_json()),
            total_votes: Set(0),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };

        let created = self.comment_repo.create(model).await?;
        tracing::debug!(comment_id = %created.id, profile_id = %created.profile_id, "Created comment");
        Ok(created)
    }

    /// Get a comment by ID.
    pub async fn get(&self, id: &str) -> AppResult<comment::Model> {
        self.comment_repo.get_by_id(id).await
    }

    /// Load summaries keyed by comment ID. Unknown IDs are simply absent.
    pub async fn summaries(&self, ids: &[String]) -> AppResult<HashMap<String, CommentSummary>> {
        let comments = self.comment_repo.find_by_ids(ids).await?;
        Ok(comments
            .iter()
            .map(|c| (c.id.clone(), CommentSummary::from(c)))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use serde_json::json;
    use std::sync::Arc;

    fn create_test_comment(id: &str) -> comment::Model {
        comment::Model {
            id: id.to_string(),
            profile_id: "profile1".to_string(),
            author: "tester".to_string(),
            title: Some("Clearly a 4w5".to_string()),
            content: "Reads like a 4w5 to me".to_string(),
            vote_stats: json!({}),
            total_votes: 0,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_comment() {
        let comment = create_test_comment("01hzx3k5m9n8p7q6r5s4t3v2w1");
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[comment]])
                .into_connection(),
        );

        let service = CommentService::new(CommentRepository::new(db));
        let created = service
            .create(CreateCommentInput {
                profile_id: "profile1".to_string(),
                author: "tester".to_string(),
                title: Some("Clearly a 4w5".to_string()),
                content: "Reads like a 4w5 to me".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(created.total_votes, 0);
        assert_eq!(created.vote_stats, json!({}));
    }

    #[tokio::test]
    async fn test_create_rejects_blank_content() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let service = CommentService::new(CommentRepository::new(db));

        let result = service
            .create(CreateCommentInput {
                profile_id: "profile1".to_string(),
                author: "tester".to_string(),
                title: None,
                content: "   ".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_summaries_keyed_by_id() {
        let c1 = create_test_comment("01hzx3k5m9n8p7q6r5s4t3v2w1");
        let c2 = create_test_comment("01hzx3k5m9n8p7q6r5s4t3v2w2");
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[c1, c2]])
                .into_connection(),
        );

        let service = CommentService::new(CommentRepository::new(db));
        let summaries = service
            .summaries(&[
                "01hzx3k5m9n8p7q6r5s4t3v2w1".to_string(),
                "01hzx3k5m9n8p7q6r5s4t3v2w2".to_string(),
            ])
            .await
            .unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(
            summaries["01hzx3k5m9n8p7q6r5s4t3v2w1"].title.as_deref(),
            Some("Clearly a 4w5")
        );
    }
}
