//! GET /api/v1/forms/{kind} - The content form as the caller would see it

use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::ContentKind;
use crate::services::content::form_for;
use crate::services::ContentForm;

pub async fn get_form(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(kind): Path<String>,
) -> Result<Json<ContentForm>, ApiError> {
    let kind: ContentKind = kind
        .parse()
        .map_err(|_| ApiError::not_found(format!("Unknown form '{}'", kind)))?;
    Ok(Json(form_for(state.publisher_repo.as_ref(), &user.0, kind).await?))
}
