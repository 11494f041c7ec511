//! Comment endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use persona_common::AppResult;
use persona_core::{CreateCommentInput, VoteTally, services::vote::validate_comment_id};
use persona_db::entities::comment;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{middleware::AppState, response::ApiResponse};

/// Create comment request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 64))]
    pub profile_id: String,

    #[validate(length(min = 1, max = 100))]
    pub author: String,

    #[validate(length(max = 200))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 10000))]
    pub content: String,
}

/// Comment response, including its tally.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: String,
    pub profile_id: String,
    pub author: String,
    pub title: Option<String>,
    pub content: String,
    #[serde(flatten)]
    pub tally: VoteTally,
    pub created_at: String,
}

impl From<comment::Model> for CommentResponse {
    fn from(c: comment::Model) -> Self {
        let tally = VoteTally::from_comment(&c);
        Self {
            id: c.id,
            profile_id: c.profile_id,
            author: c.author,
            title: c.title,
            content: c.content,
            tally,
            created_at: c.created_at.to_rfc3339(),
        }
    }
}

/// Create a comment.
async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateCommentRequest>,
) -> AppResult<ApiResponse<CommentResponse>> {
    req.validate()?;

    let comment = state
        .comment_service
        .create(CreateCommentInput {
            profile_id: req.profile_id,
            author: req.author,
            title: req.title,
            content: req.content,
        })
        .await?;

    Ok(ApiResponse::created(comment.into()))
}

/// Get a comment.
async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<CommentResponse>> {
    validate_comment_id(&id)?;
    let comment = state.comment_service.get(&id).await?;
    Ok(ApiResponse::ok(comment.into()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/{id}", get(show))
}
