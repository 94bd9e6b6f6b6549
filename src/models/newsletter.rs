//! Newsletter and newsletter issue models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ContentStatus;

/// A recurring publication readers can subscribe to directly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Newsletter {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub subject: String,
    pub status: ContentStatus,
    pub author_id: i64,
    pub publisher_id: Option<i64>,
    /// Inactive newsletters accept no new subscribers and dispatch no issues
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Newsletter {
    pub fn is_published(&self) -> bool {
        self.status == ContentStatus::Published
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNewsletterInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: String,
    pub status: Option<ContentStatus>,
    pub publisher_id: Option<i64>,
}

impl CreateNewsletterInput {
    pub fn new(title: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subject: subject.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: ContentStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNewsletterInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub status: Option<ContentStatus>,
    pub publisher_id: Option<i64>,
    pub is_active: Option<bool>,
}

/// One edition of a newsletter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsletterIssue {
    pub id: i64,
    pub newsletter_id: i64,
    pub subject: String,
    pub body: String,
    pub featured_article_ids: Vec<i64>,
    /// Null until dispatched
    pub sent_at: Option<DateTime<Utc>>,
    pub is_draft: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateIssueInput {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub featured_article_ids: Vec<i64>,
}
