//! Collaboration invitations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserRole;

/// A token-bearing offer for an email address to join a publisher.
///
/// Single use: once `accepted` is set the token no longer resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationInvitation {
    pub id: i64,
    pub email: String,
    pub publisher_id: i64,
    /// Role granted on acceptance, journalist or editor
    pub role: UserRole,
    pub token: String,
    pub accepted: bool,
    pub invited_by: i64,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

/// Input for sending an invitation
#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvitationInput {
    pub email: String,
    pub role: UserRole,
}
