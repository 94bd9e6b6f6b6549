//! API middleware
//!
//! Contains:
//! - Application state shared by all handlers
//! - Session authentication (bearer token or `session` cookie)
//! - The JSON error envelope and its mapping from service errors
//! - Request statistics

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::db::repositories::{
    PublisherRepository, SqlxArticleRepository, SqlxCommentRepository, SqlxInvitationRepository,
    SqlxJoinRequestRepository, SqlxNewsletterRepository, SqlxPublisherRepository,
    SqlxSessionRepository, SqlxSubscriptionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    ArticleService, CommentService, DynAnnouncer, DynNotifier, LoginRateLimiter,
    NewsletterService, NotificationService, PublisherService, ServiceError, SubscriptionService,
    UserService, UserServiceError,
};

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    total_requests: AtomicU64,
    /// Total response time in microseconds
    total_response_time_us: AtomicU64,
    server_errors: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, duration_us: u64, server_error: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(duration_us, Ordering::Relaxed);
        if server_error {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn server_errors(&self) -> u64 {
        self.server_errors.load(Ordering::Relaxed)
    }

    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let total_time = self.total_response_time_us.load(Ordering::Relaxed);
        total_time as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub article_service: Arc<ArticleService>,
    pub newsletter_service: Arc<NewsletterService>,
    pub publisher_service: Arc<PublisherService>,
    pub subscription_service: Arc<SubscriptionService>,
    pub comment_service: Arc<CommentService>,
    pub publisher_repo: Arc<dyn PublisherRepository>,
    pub rate_limiter: Arc<LoginRateLimiter>,
    pub request_stats: Arc<RequestStats>,
    /// Lifetime of the session cookie in seconds
    pub session_max_age: i64,
}

impl AppState {
    /// Wire repositories and services over `pool`
    pub fn build(
        pool: DynDatabasePool,
        config: &Config,
        notifier: DynNotifier,
        announcer: DynAnnouncer,
    ) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let article_repo = SqlxArticleRepository::boxed(pool.clone());
        let newsletter_repo = SqlxNewsletterRepository::boxed(pool.clone());
        let publisher_repo = SqlxPublisherRepository::boxed(pool.clone());
        let subscription_repo = SqlxSubscriptionRepository::boxed(pool.clone());

        let notifications = Arc::new(NotificationService::new(
            subscription_repo.clone(),
            newsletter_repo.clone(),
            user_repo.clone(),
            notifier,
            announcer,
            config.notify.clone(),
        ));

        Self {
            user_service: Arc::new(UserService::with_session_expiration(
                user_repo.clone(),
                session_repo,
                config.session.expiration_days,
            )),
            article_service: Arc::new(ArticleService::new(
                article_repo.clone(),
                publisher_repo.clone(),
                notifications.clone(),
            )),
            newsletter_service: Arc::new(NewsletterService::new(
                newsletter_repo,
                article_repo.clone(),
                publisher_repo.clone(),
                notifications,
            )),
            publisher_service: Arc::new(PublisherService::new(
                publisher_repo.clone(),
                SqlxInvitationRepository::boxed(pool.clone()),
                SqlxJoinRequestRepository::boxed(pool.clone()),
            )),
            subscription_service: Arc::new(SubscriptionService::new(
                subscription_repo,
                publisher_repo.clone(),
                user_repo,
            )),
            comment_service: Arc::new(CommentService::new(
                SqlxCommentRepository::boxed(pool.clone()),
                article_repo,
                publisher_repo.clone(),
            )),
            publisher_repo,
            rate_limiter: Arc::new(LoginRateLimiter::new()),
            request_stats: Arc::new(RequestStats::new()),
            session_max_age: config.session.expiration_days * 24 * 60 * 60,
            pool,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ServiceError::NotFound { .. } => ApiError::not_found(err.to_string()),
            ServiceError::Validation(fields) => ApiError::with_details(
                "VALIDATION_ERROR",
                "Invalid input",
                serde_json::to_value(&fields).unwrap_or_default(),
            ),
            ServiceError::Conflict(msg) => ApiError::conflict(msg),
            ServiceError::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(_) => {
                ApiError::unauthorized("Invalid username or password")
            }
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::SessionExpired | UserServiceError::SessionNotFound => {
                ApiError::unauthorized("Invalid or expired session")
            }
            UserServiceError::RateLimited(msg) => ApiError::new("RATE_LIMIT", msg),
            UserServiceError::InternalError(e) => {
                tracing::error!("Request failed: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// The user behind the request, if it carried a valid session
#[derive(Debug, Clone)]
pub struct Viewer(pub Option<User>);

impl Viewer {
    pub fn user(&self) -> Option<&User> {
        self.0.as_ref()
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Viewer(
            parts
                .extensions
                .get::<AuthenticatedUser>()
                .map(|user| user.0.clone()),
        ))
    }
}

/// Session token from `Authorization: Bearer` or the `session` cookie
pub(crate) fn extract_session_token(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }

    headers
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .find_map(|c| c.trim().strip_prefix("session="))
                .map(str::to_string)
        })
        .filter(|token| !token.is_empty())
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Attach the user when a valid session is present; never rejects
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(request.headers()) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session lookup failed: {}", e),
        }
    }
    next.run(request).await
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

/// Request statistics middleware
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    let duration_us = start.elapsed().as_micros() as u64;
    state
        .request_stats
        .record(duration_us, response.status().is_server_error());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::FieldErrors;
    use axum::http::HeaderMap;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), value.parse().unwrap());
        }
        map
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer test-token-123")]);
        assert_eq!(extract_session_token(&map), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let map = headers(&[(header::COOKIE, "theme=dark; session=test-token-456")]);
        assert_eq!(extract_session_token(&map), Some("test-token-456".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let map = headers(&[
            (header::AUTHORIZATION, "Bearer bearer-token"),
            (header::COOKIE, "session=cookie-token"),
        ]);
        assert_eq!(extract_session_token(&map), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_none() {
        assert!(extract_session_token(&HeaderMap::new()).is_none());
        let map = headers(&[(header::AUTHORIZATION, "Basic invalid")]);
        assert!(extract_session_token(&map).is_none());
        let map = headers(&[(header::COOKIE, "session=")]);
        assert!(extract_session_token(&map).is_none());
    }

    #[test]
    fn test_service_error_mapping() {
        let cases = [
            (ServiceError::forbidden("no"), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (ServiceError::not_found("Article", 7), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (ServiceError::conflict("taken"), StatusCode::CONFLICT, "CONFLICT"),
            (
                ServiceError::Internal(anyhow::anyhow!("db down")),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];
        for (err, status, code) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status(), status);
            assert_eq!(api.error.code, code);
        }

        let api: ApiError = ServiceError::not_found("Article", 7).into();
        assert_eq!(api.error.message, "Article 7 not found");
    }

    #[test]
    fn test_validation_details_carry_fields() {
        let api: ApiError = ServiceError::Validation(FieldErrors::single("title", "This field is required.")).into();
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            api.error.details,
            Some(serde_json::json!({"title": ["This field is required."]}))
        );
    }

    #[test]
    fn test_user_error_mapping() {
        let api: ApiError = UserServiceError::UserExists("bob".into()).into();
        assert_eq!(api.status(), StatusCode::CONFLICT);
        let api: ApiError = UserServiceError::RateLimited("slow down".into()).into();
        assert_eq!(api.status(), StatusCode::TOO_MANY_REQUESTS);
        let api: ApiError = UserServiceError::AuthenticationError("bad".into()).into();
        assert_eq!(api.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_request_stats() {
        let stats = RequestStats::new();
        assert_eq!(stats.avg_response_time_us(), 0.0);
        stats.record(100, false);
        stats.record(300, true);
        assert_eq!(stats.total_requests(), 2);
        assert_eq!(stats.server_errors(), 1);
        assert_eq!(stats.avg_response_time_us(), 200.0);
    }
}
