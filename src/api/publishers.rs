//! Publisher and membership API endpoints
//!
//! - GET/POST /api/v1/publishers, GET /api/v1/publishers/{id}
//! - POST /api/v1/publishers/{id}/invitations - Invite by email
//! - GET /api/v1/invitations - Pending invitations for the caller
//! - POST /api/v1/invitations/{token}/accept
//! - POST/GET /api/v1/publishers/{id}/join-requests
//! - POST /api/v1/join-requests/{id}/approve | /reject

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    CollaborationInvitation, CreateInvitationInput, CreatePublisherInput, JoinRequest,
    JoinRequestStatus, Publisher,
};
use crate::services::PublisherDetails;

/// Filter for the join-request listing
#[derive(Debug, Deserialize)]
pub struct JoinRequestQuery {
    pub status: Option<JoinRequestStatus>,
}

pub async fn list_publishers(
    State(state): State<AppState>,
) -> Result<Json<Vec<Publisher>>, ApiError> {
    Ok(Json(state.publisher_service.list().await?))
}

pub async fn get_publisher(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PublisherDetails>, ApiError> {
    Ok(Json(state.publisher_service.get(id).await?))
}

pub async fn create_publisher(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreatePublisherInput>,
) -> Result<(StatusCode, Json<Publisher>), ApiError> {
    let publisher = state.publisher_service.create(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(publisher)))
}

pub async fn invite_member(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<CreateInvitationInput>,
) -> Result<(StatusCode, Json<CollaborationInvitation>), ApiError> {
    let invitation = state.publisher_service.invite(&user.0, id, body).await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

pub async fn my_invitations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<CollaborationInvitation>>, ApiError> {
    Ok(Json(state.publisher_service.my_invitations(&user.0).await?))
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(token): Path<String>,
) -> Result<Json<Publisher>, ApiError> {
    Ok(Json(
        state
            .publisher_service
            .accept_invitation(&user.0, &token)
            .await?,
    ))
}

pub async fn request_join(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<JoinRequest>), ApiError> {
    let request = state.publisher_service.request_join(&user.0, id).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_join_requests(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Query(query): Query<JoinRequestQuery>,
) -> Result<Json<Vec<JoinRequest>>, ApiError> {
    Ok(Json(
        state
            .publisher_service
            .join_requests(&user.0, id, query.status)
            .await?,
    ))
}

pub async fn approve_join_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<JoinRequest>, ApiError> {
    Ok(Json(
        state
            .publisher_service
            .decide_join_request(&user.0, id, true)
            .await?,
    ))
}

pub async fn reject_join_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<JoinRequest>, ApiError> {
    Ok(Json(
        state
            .publisher_service
            .decide_join_request(&user.0, id, false)
            .await?,
    ))
}
