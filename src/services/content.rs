//! Workflow rules shared by articles and newsletters
//!
//! Publisher resolution on creation, who may see or edit unpublished
//! content, and the result type returned by operations that may publish.

use crate::db::repositories::PublisherRepository;
use crate::models::{ContentKind, ContentStatus, User};
use crate::services::authorization::{require, Action};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::forms::{ContentForm, FIELD_PUBLISHER};
use crate::services::notification::FanOutReport;
use serde::Serialize;

/// Content returned from a write, with the fan-out report when the write
/// published it
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome<T> {
    pub content: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<FanOutReport>,
}

/// Form for `user` together with their membership count
pub async fn form_for(
    publishers: &dyn PublisherRepository,
    user: &User,
    kind: ContentKind,
) -> ServiceResult<ContentForm> {
    let memberships = publishers.memberships_of(user.id).await?;
    Ok(ContentForm::for_user(Some(user), kind, memberships.len()))
}

/// Decide the publisher of new content.
///
/// An explicit choice must be one of the user's publishers (any existing
/// publisher for admins). Without a choice the single membership is used,
/// no membership means independent and several require a selection.
pub async fn resolve_publisher(
    publishers: &dyn PublisherRepository,
    user: &User,
    explicit: Option<i64>,
) -> ServiceResult<Option<i64>> {
    if let Some(publisher_id) = explicit {
        let allowed = if user.is_admin() {
            publishers.get_by_id(publisher_id).await?.is_some()
        } else {
            publishers.is_member(user.id, publisher_id).await?
        };
        return if allowed {
            Ok(Some(publisher_id))
        } else {
            Err(ServiceError::invalid(
                FIELD_PUBLISHER,
                format!("Invalid publisher {}: you are not a member.", publisher_id),
            ))
        };
    }

    let memberships = publishers.memberships_of(user.id).await?;
    match memberships.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some(only.publisher_id)),
        _ => Err(ServiceError::invalid(
            FIELD_PUBLISHER,
            "You belong to several publishers; select one.",
        )),
    }
}

/// Unpublished content is visible to its author, members of its publisher
/// and admins
pub async fn can_view(
    publishers: &dyn PublisherRepository,
    viewer: Option<&User>,
    status: ContentStatus,
    author_id: i64,
    publisher_id: Option<i64>,
) -> ServiceResult<bool> {
    if status == ContentStatus::Published {
        return Ok(true);
    }
    let Some(user) = viewer else {
        return Ok(false);
    };
    if user.id == author_id || user.is_admin() {
        return Ok(true);
    }
    match publisher_id {
        Some(id) => Ok(publishers.is_member(user.id, id).await?),
        None => Ok(false),
    }
}

/// Edit rights: the author, an editor of the content's publisher, or an admin
pub async fn require_editor_of(
    publishers: &dyn PublisherRepository,
    user: &User,
    author_id: i64,
    publisher_id: Option<i64>,
) -> ServiceResult<()> {
    if user.id == author_id || user.is_admin() {
        return Ok(());
    }
    if user.is_editor() {
        if let Some(id) = publisher_id {
            if publishers.is_member(user.id, id).await? {
                return Ok(());
            }
        }
    }
    Err(ServiceError::forbidden("Only the author, a publisher editor or an admin may change this content"))
}

/// Deletion rights: the author or an admin
pub fn require_owner(user: &User, author_id: i64) -> ServiceResult<()> {
    if user.id == author_id {
        return Ok(());
    }
    require(user, Action::ManageAnyContent)
}
