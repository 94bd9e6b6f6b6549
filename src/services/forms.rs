//! Role-aware content forms
//!
//! Decides which fields a user may submit for an article or newsletter and
//! which statuses they may pick, then validates submissions against that.
//! Journalists never see the publisher field, and cannot choose a status
//! beyond pending (draft only when they belong to no publisher).

use crate::models::{ContentKind, ContentStatus, User, UserRole};
use crate::services::error::{FieldErrors, ServiceResult};
use serde::Serialize;

pub const MAX_TITLE_LEN: usize = 255;

pub const FIELD_TITLE: &str = "title";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_PUBLISHER: &str = "publisher";

/// Field set and status choices available to one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentForm {
    pub kind: ContentKind,
    pub fields: Vec<&'static str>,
    pub status_choices: Vec<ContentStatus>,
}

/// The form-controlled part of a create or update request
#[derive(Debug, Clone, Default)]
pub struct ContentSubmission {
    pub title: Option<String>,
    pub status: Option<ContentStatus>,
    pub publisher: Option<i64>,
}

impl ContentForm {
    /// Build the form for `user`.
    ///
    /// `None` is the system context and gets the unrestricted form.
    pub fn for_user(user: Option<&User>, kind: ContentKind, membership_count: usize) -> Self {
        let mut fields = vec![FIELD_TITLE];
        fields.push(match kind {
            ContentKind::Article => "content",
            ContentKind::Newsletter => "description",
        });
        if kind == ContentKind::Newsletter {
            fields.push("subject");
        }
        fields.push(FIELD_STATUS);

        let journalist = user.is_some_and(|u| u.role == UserRole::Journalist);
        let status_choices = if !journalist {
            fields.push(FIELD_PUBLISHER);
            ContentStatus::ALL.to_vec()
        } else if membership_count > 0 {
            vec![ContentStatus::Draft, ContentStatus::Pending]
        } else {
            vec![ContentStatus::Draft]
        };

        Self {
            kind,
            fields,
            status_choices,
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains(&field)
    }

    pub fn allows_status(&self, status: ContentStatus) -> bool {
        self.status_choices.contains(&status)
    }

    /// Field-level validation. `require_title` is set for creation;
    /// updates may leave the title out.
    pub fn validate(&self, submission: &ContentSubmission, require_title: bool) -> ServiceResult<()> {
        let mut errors = FieldErrors::new();

        match submission.title.as_deref().map(str::trim) {
            None | Some("") if require_title => errors.add(FIELD_TITLE, "This field is required."),
            Some("") => errors.add(FIELD_TITLE, "This field may not be blank."),
            Some(title) if title.chars().count() > MAX_TITLE_LEN => errors.add(
                FIELD_TITLE,
                format!("Ensure this field has no more than {} characters.", MAX_TITLE_LEN),
            ),
            _ => {}
        }

        if let Some(status) = submission.status {
            if !self.allows_status(status) {
                errors.add(
                    FIELD_STATUS,
                    format!("\"{}\" is not a valid choice.", status.as_str()),
                );
            }
        }

        if submission.publisher.is_some() && !self.has_field(FIELD_PUBLISHER) {
            errors.add(FIELD_PUBLISHER, "This field is not available.");
        }

        errors.into_result()
    }
}
