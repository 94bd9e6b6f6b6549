//! Comment API endpoints
//!
//! - GET /api/v1/articles/{id}/comments - Threaded comments
//! - POST /api/v1/articles/{id}/comments - Add a comment or reply
//! - DELETE /api/v1/comments/{id} - Delete (author or admin)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, Viewer};
use crate::models::{Comment, CommentThread, CreateCommentInput};

pub async fn list_comments(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(article_id): Path<i64>,
) -> Result<Json<Vec<CommentThread>>, ApiError> {
    Ok(Json(
        state
            .comment_service
            .threads(article_id, viewer.user())
            .await?,
    ))
}

pub async fn create_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(article_id): Path<i64>,
    Json(body): Json<CreateCommentInput>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let comment = state
        .comment_service
        .create(&user.0, article_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.comment_service.delete(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
