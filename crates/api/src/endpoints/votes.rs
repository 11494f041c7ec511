//! Vote endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    routing::{get, post},
};
use persona_common::{AppError, AppResult};
use persona_core::{
    BulkSummary, CommentStats, HistoryEntry, HistoryOrder, HistoryQuery, Page, PersonalitySystem,
    PublicVote, SubmitStatus, SubmitVoteInput, SystemStats, TopComment, VoteOutcome,
    catalog::{self, CatalogEntry},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::{extractors::Voter, middleware::AppState, response::ApiResponse};

/// Largest accepted bulk submission.
const MAX_BULK_ITEMS: usize = 100;

/// Submit vote request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitVoteRequest {
    #[validate(length(min = 1, max = 64))]
    pub comment_id: String,

    #[validate(length(min = 1, max = 16))]
    pub personality_system: String,

    #[validate(length(min = 1, max = 32))]
    pub personality_value: String,

    #[validate(length(min = 1, max = 64))]
    pub profile_id: Option<String>,
}

impl SubmitVoteRequest {
    fn into_input(self, voter: &Voter) -> SubmitVoteInput {
        SubmitVoteInput {
            comment_id: self.comment_id,
            personality_system: self.personality_system,
            personality_value: self.personality_value,
            voter_identifier: voter.0.as_str().to_string(),
            profile_id: self.profile_id,
        }
    }
}

/// Submit or change a vote.
async fn submit(
    voter: Voter,
    State(state): State<AppState>,
    Json(req): Json<SubmitVoteRequest>,
) -> AppResult<ApiResponse<VoteOutcome>> {
    req.validate()?;

    let outcome = state.vote_service.submit(req.into_input(&voter)).await?;
    Ok(ApiResponse::ok(outcome))
}

/// Error detail of a failed bulk item.
#[derive(Debug, Serialize)]
pub struct ItemError {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ItemError {
    fn from(e: &AppError) -> Self {
        Self {
            code: e.error_code().to_string(),
            message: e.to_string(),
        }
    }
}

/// Result of one bulk item.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemResponse {
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SubmitStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_update: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<PublicVote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

impl BulkItemResponse {
    fn new(index: usize, result: AppResult<VoteOutcome>) -> Self {
        match result {
            Ok(outcome) => Self {
                index,
                success: true,
                status: Some(outcome.status),
                is_update: Some(outcome.is_update),
                vote: Some(outcome.vote),
                error: None,
            },
            Err(e) => Self {
                index,
                success: false,
                status: None,
                is_update: None,
                vote: None,
                error: Some(ItemError::from(&e)),
            },
        }
    }
}

/// Bulk submission response.
#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub results: Vec<BulkItemResponse>,
    pub summary: BulkSummary,
}

/// Submit several votes. Items succeed or fail independently.
async fn submit_bulk(
    voter: Voter,
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> AppResult<ApiResponse<BulkResponse>> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let Value::Array(items) = body else {
        return Err(AppError::Validation(
            "body: expected a JSON array of votes".to_string(),
        ));
    };
    if items.len() > MAX_BULK_ITEMS {
        return Err(AppError::Validation(format!(
            "body: at most {MAX_BULK_ITEMS} votes per request"
        )));
    }

    let mut results = Vec::with_capacity(items.len());
    let mut inputs = Vec::new();
    let mut positions = Vec::new();

    for (index, item) in items.into_iter().enumerate() {
        match decode_item(item) {
            Ok(req) => {
                positions.push(index);
                inputs.push(req.into_input(&voter));
            }
            Err(e) => results.push(BulkItemResponse::new(index, Err(e))),
        }
    }

    let outcome = state.vote_service.submit_bulk(inputs).await;
    results.extend(
        outcome
            .results
            .into_iter()
            .map(|item| BulkItemResponse::new(positions[item.index], item.result)),
    );
    results.sort_by_key(|r| r.index);

    let succeeded = results.iter().filter(|r| r.success).count();
    let summary = BulkSummary {
        total: results.len(),
        succeeded,
        failed: results.len() - succeeded,
    };
    tracing::debug!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "Bulk vote submission processed"
    );

    Ok(ApiResponse::ok(BulkResponse { results, summary }))
}

fn decode_item(item: Value) -> AppResult<SubmitVoteRequest> {
    let req: SubmitVoteRequest = serde_json::from_value(item)
        .map_err(|e| AppError::Validation(format!("item: {e}")))?;
    req.validate()?;
    Ok(req)
}

/// Remove vote request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RemoveVoteRequest {
    #[validate(length(min = 1, max = 64))]
    pub comment_id: String,

    #[validate(length(min = 1, max = 16))]
    pub personality_system: String,
}

/// Remove vote response.
#[derive(Debug, Serialize)]
pub struct RemoveVoteResponse {
    pub removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<PublicVote>,
}

/// Withdraw the caller's vote in one system.
async fn remove(
    Voter(voter): Voter,
    State(state): State<AppState>,
    Json(req): Json<RemoveVoteRequest>,
) -> AppResult<ApiResponse<RemoveVoteResponse>> {
    req.validate()?;

    let vote = state
        .vote_service
        .remove(&req.comment_id, voter.as_str(), &req.personality_system)
        .await?;

    Ok(ApiResponse::ok(RemoveVoteResponse {
        removed: vote.is_some(),
        vote,
    }))
}

/// Tally of a comment.
async fn comment_stats(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
) -> AppResult<ApiResponse<CommentStats>> {
    let stats = state.vote_stats_service.comment_stats(&comment_id).await?;
    Ok(ApiResponse::ok(stats))
}

/// Paging parameters for vote listings.
#[derive(Debug, Deserialize)]
pub struct CommentVotesQuery {
    pub system: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Active votes on a comment.
async fn comment_votes(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    Query(query): Query<CommentVotesQuery>,
) -> AppResult<ApiResponse<Page<PublicVote>>> {
    let system = parse_system(query.system.as_deref())?;
    let page = state
        .vote_stats_service
        .comment_votes(&comment_id, system, query.page, query.limit)
        .await?;
    Ok(ApiResponse::ok(page))
}

/// Top comments query.
#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub system: Option<String>,
    pub limit: Option<u64>,
}

/// Most-voted comments.
async fn top(
    State(state): State<AppState>,
    Query(query): Query<TopQuery>,
) -> AppResult<ApiResponse<Vec<TopComment>>> {
    let system = parse_system(query.system.as_deref())?;
    let top = state
        .vote_stats_service
        .top_comments(system, query.limit)
        .await?;
    Ok(ApiResponse::ok(top))
}

/// System distribution query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemsQuery {
    pub comment_id: Option<String>,
}

/// Vote distribution per system and value.
async fn systems(
    State(state): State<AppState>,
    Query(query): Query<SystemsQuery>,
) -> AppResult<ApiResponse<SystemStats>> {
    let stats = state
        .vote_stats_service
        .system_stats(query.comment_id.as_deref())
        .await?;
    Ok(ApiResponse::ok(stats))
}

/// Voting history query.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub system: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub order: Option<String>,
}

/// The caller's own votes.
async fn history(
    Voter(voter): Voter,
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> AppResult<ApiResponse<Page<HistoryEntry>>> {
    let query = HistoryQuery {
        system: parse_system(params.system.as_deref())?,
        page: params.page,
        limit: params.limit,
        order: params
            .order
            .as_deref()
            .map(str::parse::<HistoryOrder>)
            .transpose()?
            .unwrap_or_default(),
    };

    let page = state
        .vote_stats_service
        .voter_history(voter.as_str(), query)
        .await?;
    Ok(ApiResponse::ok(page))
}

/// Count query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountQuery {
    pub comment_id: Option<String>,
    pub system: Option<String>,
}

/// Count response.
#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

/// Number of active votes.
async fn count(
    State(state): State<AppState>,
    Query(query): Query<CountQuery>,
) -> AppResult<ApiResponse<CountResponse>> {
    let system = parse_system(query.system.as_deref())?;
    let count = state
        .vote_stats_service
        .count(query.comment_id.as_deref(), system)
        .await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

/// Legal values per system.
async fn catalog_values() -> ApiResponse<Vec<CatalogEntry>> {
    ApiResponse::ok(catalog::catalog())
}

fn parse_system(raw: Option<&str>) -> AppResult<Option<PersonalitySystem>> {
    raw.map(|s| {
        s.parse::<PersonalitySystem>()
            .map_err(|e| AppError::Validation(format!("system: {e}")))
    })
    .transpose()
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(submit).delete(remove))
        .route("/bulk", post(submit_bulk))
        .route("/comments/{id}", get(comment_votes))
        .route("/comments/{id}/stats", get(comment_stats))
        .route("/top", get(top))
        .route("/systems", get(systems))
        .route("/history", get(history))
        .route("/count", get(count))
        .route("/catalog", get(catalog_values))
}
