//! Newsletter API endpoints
//!
//! Same shape as the article endpoints, plus:
//! - POST/DELETE /api/v1/newsletters/{id}/subscribe - Direct subscription
//! - POST/GET /api/v1/newsletters/{id}/issues - Draft and list issues
//! - POST /api/v1/newsletters/{id}/issues/{issue_id}/dispatch - Send an issue

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::api::common::{CreateContext, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, Viewer};
use crate::api::responses::SubscriptionChange;
use crate::models::{
    CreateIssueInput, CreateNewsletterInput, Newsletter, NewsletterIssue, PagedResult,
    UpdateNewsletterInput,
};
use crate::services::{Decision, WorkflowOutcome};

/// GET /api/v1/newsletters
pub async fn list_newsletters(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Newsletter>>, ApiError> {
    Ok(Json(
        state.newsletter_service.list_published(&query.into()).await?,
    ))
}

/// GET /api/v1/newsletters/{id}
pub async fn get_newsletter(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> Result<Json<Newsletter>, ApiError> {
    Ok(Json(state.newsletter_service.get(id, viewer.user()).await?))
}

/// POST /api/v1/newsletters
pub async fn create_newsletter(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(context): Query<CreateContext>,
    Json(body): Json<CreateNewsletterInput>,
) -> Result<(StatusCode, Json<WorkflowOutcome<Newsletter>>), ApiError> {
    let outcome = state
        .newsletter_service
        .create(&user.0, body, context.publisher_id)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// PUT /api/v1/newsletters/{id}
pub async fn update_newsletter(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateNewsletterInput>,
) -> Result<Json<WorkflowOutcome<Newsletter>>, ApiError> {
    Ok(Json(state.newsletter_service.update(&user.0, id, body).await?))
}

/// DELETE /api/v1/newsletters/{id}
pub async fn delete_newsletter(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.newsletter_service.delete(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/newsletters/mine
pub async fn my_newsletters(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Newsletter>>, ApiError> {
    Ok(Json(state.newsletter_service.mine(&user.0).await?))
}

/// GET /api/v1/newsletters/review-queue
pub async fn review_queue(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Newsletter>>, ApiError> {
    Ok(Json(state.newsletter_service.review_queue(&user.0).await?))
}

/// POST /api/v1/newsletters/{id}/approve
pub async fn approve_newsletter(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<WorkflowOutcome<Newsletter>>, ApiError> {
    Ok(Json(
        state
            .newsletter_service
            .review(&user.0, id, Decision::Approve)
            .await?,
    ))
}

/// POST /api/v1/newsletters/{id}/reject
pub async fn reject_newsletter(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<WorkflowOutcome<Newsletter>>, ApiError> {
    Ok(Json(
        state
            .newsletter_service
            .review(&user.0, id, Decision::Reject)
            .await?,
    ))
}

/// POST /api/v1/newsletters/{id}/subscribe
pub async fn subscribe(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<SubscriptionChange>, ApiError> {
    let changed = state.newsletter_service.subscribe(&user.0, id).await?;
    Ok(Json(SubscriptionChange {
        subscribed: true,
        changed,
    }))
}

/// DELETE /api/v1/newsletters/{id}/subscribe
pub async fn unsubscribe(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<SubscriptionChange>, ApiError> {
    let changed = state.newsletter_service.unsubscribe(&user.0, id).await?;
    Ok(Json(SubscriptionChange {
        subscribed: false,
        changed,
    }))
}

/// POST /api/v1/newsletters/{id}/issues
pub async fn create_issue(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<CreateIssueInput>,
) -> Result<(StatusCode, Json<NewsletterIssue>), ApiError> {
    let issue = state.newsletter_service.create_issue(&user.0, id, body).await?;
    Ok((StatusCode::CREATED, Json(issue)))
}

/// GET /api/v1/newsletters/{id}/issues
pub async fn list_issues(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> Result<Json<Vec<NewsletterIssue>>, ApiError> {
    Ok(Json(
        state.newsletter_service.list_issues(id, viewer.user()).await?,
    ))
}

/// POST /api/v1/newsletters/{id}/issues/{issue_id}/dispatch
pub async fn dispatch_issue(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((id, issue_id)): Path<(i64, i64)>,
) -> Result<Json<WorkflowOutcome<NewsletterIssue>>, ApiError> {
    Ok(Json(
        state
            .newsletter_service
            .dispatch_issue(&user.0, id, issue_id)
            .await?,
    ))
}
