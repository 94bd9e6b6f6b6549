//! Article API endpoints
//!
//! - GET /api/v1/articles - Published articles, paginated
//! - GET /api/v1/articles/{id} - One article, subject to visibility
//! - POST /api/v1/articles - Create (`?publisher_id=` picks the publisher)
//! - PUT /api/v1/articles/{id} - Update
//! - DELETE /api/v1/articles/{id} - Delete (author or admin)
//! - GET /api/v1/articles/mine - The caller's articles
//! - GET /api/v1/articles/review-queue - Pending articles awaiting the caller
//! - POST /api/v1/articles/{id}/approve | /reject - Review decision

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::api::common::{CreateContext, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, Viewer};
use crate::models::{Article, CreateArticleInput, PagedResult, UpdateArticleInput};
use crate::services::{Decision, WorkflowOutcome};

/// GET /api/v1/articles
pub async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Article>>, ApiError> {
    let page = state.article_service.list_published(&query.into()).await?;
    Ok(Json(page))
}

/// GET /api/v1/articles/{id}
pub async fn get_article(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> Result<Json<Article>, ApiError> {
    Ok(Json(state.article_service.get(id, viewer.user()).await?))
}

/// POST /api/v1/articles
pub async fn create_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(context): Query<CreateContext>,
    Json(body): Json<CreateArticleInput>,
) -> Result<(StatusCode, Json<WorkflowOutcome<Article>>), ApiError> {
    let outcome = state
        .article_service
        .create(&user.0, body, context.publisher_id)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// PUT /api/v1/articles/{id}
pub async fn update_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateArticleInput>,
) -> Result<Json<WorkflowOutcome<Article>>, ApiError> {
    Ok(Json(state.article_service.update(&user.0, id, body).await?))
}

/// DELETE /api/v1/articles/{id}
pub async fn delete_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.article_service.delete(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/articles/mine
pub async fn my_articles(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Article>>, ApiError> {
    Ok(Json(state.article_service.mine(&user.0).await?))
}

/// GET /api/v1/articles/review-queue
pub async fn review_queue(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Article>>, ApiError> {
    Ok(Json(state.article_service.review_queue(&user.0).await?))
}

/// POST /api/v1/articles/{id}/approve
pub async fn approve_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<WorkflowOutcome<Article>>, ApiError> {
    Ok(Json(
        state
            .article_service
            .review(&user.0, id, Decision::Approve)
            .await?,
    ))
}

/// POST /api/v1/articles/{id}/reject
pub async fn reject_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<WorkflowOutcome<Article>>, ApiError> {
    Ok(Json(
        state
            .article_service
            .review(&user.0, id, Decision::Reject)
            .await?,
    ))
}
