//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A comment on an article. `parent_id` links a reply to a comment on the same article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub article_id: i64,
    pub author_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Comment with author name and nested replies, for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentThread {
    pub id: i64,
    pub article_id: i64,
    pub author_id: i64,
    pub author_name: String,
    pub parent_id: Option<i64>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<CommentThread>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentInput {
    pub parent_id: Option<i64>,
    pub content: String,
}
