//! Subscription API endpoints
//!
//! - POST/DELETE /api/v1/subscriptions/publishers/{id}
//! - POST/DELETE /api/v1/subscriptions/journalists/{id}
//! - GET /api/v1/subscriptions - What the caller follows
//! - GET /api/v1/subscribed-articles/{user_id} - Public feed of a user

use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::SubscriptionChange;
use crate::models::FeedArticle;
use crate::services::Subscriptions;

pub async fn subscribe_publisher(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<SubscriptionChange>, ApiError> {
    let changed = state
        .subscription_service
        .subscribe_publisher(&user.0, id)
        .await?;
    Ok(Json(SubscriptionChange {
        subscribed: true,
        changed,
    }))
}

pub async fn unsubscribe_publisher(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<SubscriptionChange>, ApiError> {
    let changed = state
        .subscription_service
        .unsubscribe_publisher(&user.0, id)
        .await?;
    Ok(Json(SubscriptionChange {
        subscribed: false,
        changed,
    }))
}

pub async fn subscribe_journalist(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<SubscriptionChange>, ApiError> {
    let changed = state
        .subscription_service
        .subscribe_journalist(&user.0, id)
        .await?;
    Ok(Json(SubscriptionChange {
        subscribed: true,
        changed,
    }))
}

pub async fn unsubscribe_journalist(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<SubscriptionChange>, ApiError> {
    let changed = state
        .subscription_service
        .unsubscribe_journalist(&user.0, id)
        .await?;
    Ok(Json(SubscriptionChange {
        subscribed: false,
        changed,
    }))
}

/// GET /api/v1/subscriptions
pub async fn my_subscriptions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Subscriptions>, ApiError> {
    Ok(Json(state.subscription_service.list(&user.0).await?))
}

/// GET /api/v1/subscribed-articles/{user_id}
///
/// Published articles from the publishers and journalists the user follows.
/// Unknown users are a 404; an article matching both edges appears once.
pub async fn subscribed_articles(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<FeedArticle>>, ApiError> {
    Ok(Json(state.subscription_service.feed(user_id).await?))
}
