//! Admin API endpoints
//!
//! All routes here sit behind `require_auth` and `require_admin`.
//! - GET /api/v1/admin/users - Paginated user list
//! - PUT /api/v1/admin/users/{id}/role - Change a user's role
//! - GET /api/v1/admin/stats - Request statistics

use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::AdminPaginationQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{UserListResponse, UserResponse};
use crate::config::DatabaseDriver;
use crate::models::UserRole;

/// App version constant
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: UserRole,
}

/// Response for system stats
#[derive(Debug, Serialize)]
pub struct SystemStatsResponse {
    pub version: String,
    pub database_driver: DatabaseDriver,
    pub uptime_seconds: u64,
    /// Uptime formatted (e.g., "2h 15m")
    pub uptime_formatted: String,
    pub total_requests: u64,
    pub server_errors: u64,
    /// Average response time in milliseconds
    pub avg_response_time_ms: f64,
}

/// Build the admin router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}/role", put(update_role))
        .route("/stats", get(get_system_stats))
}

/// GET /api/v1/admin/users
async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<AdminPaginationQuery>,
) -> Result<Json<UserListResponse>, ApiError> {
    let page = query.page.max(1);
    let per_page = query.per_page.clamp(1, 100);
    let (users, total) = state
        .user_service
        .list_users(&user.0, page, per_page)
        .await?;

    Ok(Json(UserListResponse {
        users: users.into_iter().map(UserResponse::from).collect(),
        total,
        page,
        per_page,
    }))
}

/// PUT /api/v1/admin/users/{id}/role
async fn update_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state
        .user_service
        .update_role(&user.0, id, body.role)
        .await?;
    Ok(Json(updated.into()))
}

/// GET /api/v1/admin/stats
async fn get_system_stats(
    State(state): State<AppState>,
) -> Json<SystemStatsResponse> {
    let stats = &state.request_stats;
    let uptime_seconds = stats.uptime_seconds();

    Json(SystemStatsResponse {
        version: APP_VERSION.to_string(),
        database_driver: state.pool.driver(),
        uptime_seconds,
        uptime_formatted: format_uptime(uptime_seconds),
        total_requests: stats.total_requests(),
        server_errors: stats.server_errors(),
        avg_response_time_ms: stats.avg_response_time_us() / 1000.0,
    })
}

/// Format uptime to human readable string
fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}
