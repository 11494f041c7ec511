//! Vote statistics service.
//!
//! Read-only. Per-comment stats come straight from the denormalized tally;
//! everything else is a grouped query over active votes.

use std::collections::BTreeMap;

use crate::catalog::PersonalitySystem;
use crate::services::comment::{CommentService, CommentSummary};
use crate::services::vote::{PublicVote, validate_comment_id};
use crate::tally::VoteTally;
use crate::voter::VoterId;
use persona_common::{AppError, AppResult};
use persona_db::repositories::{VoteFilter, VoteRepository};
use serde::Serialize;

/// Default number of top comments returned.
pub const DEFAULT_TOP_LIMIT: u64 = 10;
/// Default page size for listings.
pub const DEFAULT_PAGE_LIMIT: u64 = 20;
/// Largest page or ranking size accepted.
pub const MAX_LIMIT: u64 = 100;

/// Sort direction for history listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl std::str::FromStr for HistoryOrder {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desc" | "newest" => Ok(Self::NewestFirst),
            "asc" | "oldest" => Ok(Self::OldestFirst),
            other => Err(AppError::Validation(format!(
                "order: expected 'desc' or 'asc', got '{other}'"
            ))),
        }
    }
}

/// Tally of one comment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentStats {
    pub comment_id: String,
    #[serde(flatten)]
    pub tally: VoteTally,
}

/// One row of the top-comments ranking.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopComment {
    pub comment_id: String,
    pub vote_count: u64,
    /// Absent if the comment vanished between the two queries.
    pub comment: Option<CommentSummary>,
}

/// Vote distribution across systems and values.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub comment_id: Option<String>,
    pub systems: BTreeMap<PersonalitySystem, SystemBreakdown>,
    pub total_votes: u64,
}

/// Counts for one system.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemBreakdown {
    pub total: u64,
    pub values: BTreeMap<String, u64>,
}

/// One entry of a voter's history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub vote: PublicVote,
    pub comment: Option<CommentSummary>,
}

/// A page of results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

/// Query for a voter's history.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub system: Option<PersonalitySystem>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub order: HistoryOrder,
}

/// Vote statistics service.
#[derive(Clone)]
pub struct VoteStatsService {
    vote_repo: VoteRepository,
    comment_service: CommentService,
}

impl VoteStatsService {
    /// Create a new vote statistics service.
    #[must_use]
    pub const fn new(vote_repo: VoteRepository, comment_service: CommentService) -> Self {
        Self {
            vote_repo,
            comment_service,
        }
    }

    /// Stored tally of a comment.
    pub async fn comment_stats(&self, comment_id: &str) -> AppResult<CommentStats> {
        validate_comment_id(comment_id)?;
        let comment = self.comment_service.get(comment_id).await?;
        let tally = VoteTally::from_comment(&comment);

        if !tally.is_consistent() {
            tracing::warn!(
                comment_id = comment_id,
                total_votes = tally.total_votes,
                sum = tally.sum(),
                "Comment tally total disagrees with its counts"
            );
        }

        Ok(CommentStats {
            comment_id: comment.id,
            tally,
        })
    }

    /// Active votes on a comment.
    pub async fn comment_votes(
        &self,
        comment_id: &str,
        system: Option<PersonalitySystem>,
        page: Option<u64>,
        limit: Option<u64>,
    ) -> AppResult<Page<PublicVote>> {
        validate_comment_id(comment_id)?;
        let (page, limit) = paging(page, limit, DEFAULT_PAGE_LIMIT)?;

        let filter = VoteFilter {
            comment_id: Some(comment_id.to_string()),
            system,
            ..Default::default()
        };
        let total = self.vote_repo.count_active(&filter).await?;
        let votes = self
            .vote_repo
            .find_by_comment(comment_id, system, limit, (page - 1) * limit)
            .await?;

        Ok(Page {
            items: votes.into_iter().map(PublicVote::from).collect(),
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        })
    }

    /// Comments ranked by active vote count, ties broken by comment ID.
    pub async fn top_comments(
        &self,
        system: Option<PersonalitySystem>,
        limit: Option<u64>,
    ) -> AppResult<Vec<TopComment>> {
        let limit = check_limit(limit, DEFAULT_TOP_LIMIT)?;
        let ranked = self.vote_repo.top_comments(system, limit).await?;

        let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
        let mut summaries = self.comment_service.summaries(&ids).await?;

        Ok(ranked
            .into_iter()
            .map(|(comment_id, count)| TopComment {
                comment: summaries.remove(&comment_id),
                comment_id,
                vote_count: u64::try_from(count).unwrap_or(0),
            })
            .collect())
    }

    /// Active votes grouped by system and value, optionally for one comment.
    pub async fn system_stats(&self, comment_id: Option<&str>) -> AppResult<SystemStats> {
        if let Some(id) = comment_id {
            validate_comment_id(id)?;
        }
        let rows = self.vote_repo.system_stats(comment_id).await?;

        let mut systems: BTreeMap<PersonalitySystem, SystemBreakdown> = BTreeMap::new();
        let mut total_votes = 0;
        for (system, value, count) in rows {
            let count = u64::try_from(count).unwrap_or(0);
            let breakdown = systems.entry(system).or_default();
            breakdown.total += count;
            *breakdown.values.entry(value).or_default() += count;
            total_votes += count;
        }

        Ok(SystemStats {
            comment_id: comment_id.map(str::to_string),
            systems,
            total_votes,
        })
    }

    /// A voter's active votes with the comments they were cast on.
    pub async fn voter_history(
        &self,
        voter_identifier: &str,
        query: HistoryQuery,
    ) -> AppResult<Page<HistoryEntry>> {
        let voter = VoterId::parse(voter_identifier)?;
        let (page, limit) = paging(query.page, query.limit, DEFAULT_PAGE_LIMIT)?;

        let filter = VoteFilter {
            voter_identifier: Some(voter.as_str().to_string()),
            system: query.system,
            ..Default::default()
        };
        let total = self.vote_repo.count_active(&filter).await?;
        let votes = self
            .vote_repo
            .find_by_voter(
                voter.as_str(),
                query.system,
                limit,
                (page - 1) * limit,
                query.order == HistoryOrder::NewestFirst,
            )
            .await?;

        let ids: Vec<String> = votes.iter().map(|v| v.comment_id.clone()).collect();
        let summaries = self.comment_service.summaries(&ids).await?;

        let items = votes
            .into_iter()
            .map(|v| HistoryEntry {
                comment: summaries.get(&v.comment_id).cloned(),
                vote: v.into(),
            })
            .collect();

        Ok(Page {
            items,
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        })
    }

    /// Number of active votes.
    pub async fn count(
        &self,
        comment_id: Option<&str>,
        system: Option<PersonalitySystem>,
    ) -> AppResult<u64> {
        if let Some(id) = comment_id {
            validate_comment_id(id)?;
        }
        let filter = VoteFilter {
            comment_id: comment_id.map(str::to_string),
            system,
            ..Default::default()
        };
        self.vote_repo.count_active(&filter).await
    }
}

fn check_limit(limit: Option<u64>, default: u64) -> AppResult<u64> {
    match limit {
        None => Ok(default),
        Some(limit) if (1..=MAX_LIMIT).contains(&limit) => Ok(limit),
        Some(limit) => Err(AppError::Validation(format!(
            "limit: must be between 1 and {MAX_LIMIT}, got {limit}"
        ))),
    }
}

fn paging(page: Option<u64>, limit: Option<u64>, default_limit: u64) -> AppResult<(u64, u64)> {
    let page = page.unwrap_or(1);
    if page == 0 {
        return Err(AppError::Validation("page: must be at least 1".to_string()));
    }
    Ok((page, check_limit(limit, default_limit)?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use persona_db::{
        entities::{comment, vote},
        repositories::CommentRepository,
    };
    use sea_orm::{DatabaseBackend, MockDatabase};
    use serde_json::json;
    use std::collections::BTreeMap as Map;
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

    fn test_vote(id: &str, comment_id: &str, value: &str) -> vote::Model {
        vote::Model {
            id: id.to_string(),
            comment_id: comment_id.to_string(),
            profile_id: "profile1".to_string(),
            voter_identifier: "voter1".to_string(),
            personality_system: PersonalitySystem::Mbti,
            personality_value: value.to_string(),
            active: true,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    fn count_row(n: i64) -> Map<&'static str, sea_orm::Value> {
        Map::from([("num_items", sea_orm::Value::BigInt(Some(n)))])
    }

    fn service(db: MockDatabase) -> VoteStatsService {
        let conn = Arc::new(db.into_connection());
        VoteStatsService::new(
            VoteRepository::new(Arc::clone(&conn)),
            CommentService::new(CommentRepository::new(conn)),
        )
    }

    #[tokio::test]
    async fn test_comment_stats_reads_tally() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[
            test_comment(COMMENT_ID, json!({"mbti": {"INTJ": 0, "ENFP": 2}}), 2),
        ]]);

        let stats = service(db).comment_stats(COMMENT_ID).await.unwrap();

        assert_eq!(stats.tally.total_votes, 2);
        assert_eq!(stats.tally.get(PersonalitySystem::Mbti, "ENFP"), 2);
    }

    #[tokio::test]
    async fn test_comment_stats_for_unknown_comment() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<comment::Model>::new()]);

        let result = service(db).comment_stats(COMMENT_ID).await;

        assert!(matches!(result, Err(AppError::CommentNotFound(_))));
    }

    #[tokio::test]
    async fn test_top_comments_joins_summaries() {
        let second = "01hzx3k5m9n8p7q6r5s4t3v2w2";
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[
                Map::from([
                    ("comment_id", sea_orm::Value::from(COMMENT_ID)),
                    ("vote_count", sea_orm::Value::BigInt(Some(5))),
                ]),
                Map::from([
                    ("comment_id", sea_orm::Value::from(second)),
                    ("vote_count", sea_orm::Value::BigInt(Some(2))),
                ]),
            ]])
            .append_query_results([[test_comment(COMMENT_ID, json!({}), 5)]]);

        let top = service(db).top_comments(None, Some(2)).await.unwrap();

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].comment_id, COMMENT_ID);
        assert_eq!(top[0].vote_count, 5);
        assert!(top[0].comment.is_some());
        assert!(top[1].comment.is_none());
    }

    #[tokio::test]
    async fn test_top_comments_rejects_out_of_range_limit() {
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres));

        assert!(matches!(
            svc.top_comments(None, Some(0)).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            svc.top_comments(None, Some(101)).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_system_stats_groups_rows() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[
            Map::from([
                ("personality_system", sea_orm::Value::from("mbti")),
                ("personality_value", sea_orm::Value::from("ENFP")),
                ("vote_count", sea_orm::Value::BigInt(Some(2))),
            ]),
            Map::from([
                ("personality_system", sea_orm::Value::from("mbti")),
                ("personality_value", sea_orm::Value::from("INTJ")),
                ("vote_count", sea_orm::Value::BigInt(Some(1))),
            ]),
            Map::from([
                ("personality_system", sea_orm::Value::from("zodiac")),
                ("personality_value", sea_orm::Value::from("Leo")),
                ("vote_count", sea_orm::Value::BigInt(Some(4))),
            ]),
        ]]);

        let stats = service(db).system_stats(None).await.unwrap();

        assert_eq!(stats.total_votes, 7);
        assert_eq!(stats.systems[&PersonalitySystem::Mbti].total, 3);
        assert_eq!(stats.systems[&PersonalitySystem::Zodiac].values["Leo"], 4);
        assert!(!stats.systems.contains_key(&PersonalitySystem::Enneagram));
    }

    #[tokio::test]
    async fn test_voter_history_pages() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[count_row(3)]])
            .append_query_results([[
                test_vote("01hzx3k5m9n8p7q6r5s4t3v2x1", COMMENT_ID, "INTJ"),
                test_vote("01hzx3k5m9n8p7q6r5s4t3v2x2", COMMENT_ID, "ENFP"),
            ]])
            .append_query_results([[test_comment(COMMENT_ID, json!({}), 2)]]);

        let page = service(db)
            .voter_history(
                "voter1",
                HistoryQuery {
                    system: None,
                    page: Some(1),
                    limit: Some(2),
                    order: HistoryOrder::NewestFirst,
                },
            )
            .await
            .unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert!(page.items.iter().all(|e| e.comment.is_some()));
    }

    #[tokio::test]
    async fn test_voter_history_rejects_page_zero() {
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres));

        let result = svc
            .voter_history(
                "voter1",
                HistoryQuery {
                    system: None,
                    page: Some(0),
                    limit: None,
                    order: HistoryOrder::default(),
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_count_with_filters() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[count_row(4)]]);

        let count = service(db)
            .count(Some(COMMENT_ID), Some(PersonalitySystem::Zodiac))
            .await
            .unwrap();

        assert_eq!(count, 4);
    }

    #[test]
    fn test_history_order_parsing() {
        assert_eq!("desc".parse::<HistoryOrder>().unwrap(), HistoryOrder::NewestFirst);
        assert_eq!("ASC".parse::<HistoryOrder>().unwrap(), HistoryOrder::OldestFirst);
        assert!("sideways".parse::<HistoryOrder>().is_err());
    }
}
