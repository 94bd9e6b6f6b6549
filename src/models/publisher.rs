//! Publisher and membership models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserRole;

/// A publishing organization owned by one editor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publisher {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user's participation in a publisher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: i64,
    pub publisher_id: i64,
    pub joined_at: DateTime<Utc>,
}

/// Member listing entry with the user's public details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherMember {
    pub user_id: i64,
    pub username: String,
    pub role: UserRole,
    pub joined_at: DateTime<Utc>,
}

/// Input for creating a publisher
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePublisherInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
}
