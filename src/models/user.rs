//! User model
//!
//! Every account carries exactly one role. Subscription edges (publishers and
//! journalists a user follows) live in their own tables, see `db::repositories::subscription`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Username (unique)
    pub username: String,
    /// Contact address for notifications. Stored normalized, unique when present.
    pub email: Option<String>,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build an unsaved user. The password must already be hashed,
    /// see `services::password::hash_password()`.
    pub fn new(
        username: String,
        email: Option<String>,
        password_hash: String,
        role: UserRole,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username,
            email: email.map(|e| normalize_email(&e)).filter(|e| !e.is_empty()),
            password_hash,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_editor(&self) -> bool {
        self.role == UserRole::Editor
    }

    /// Address to deliver notifications to, if the user has a usable one
    pub fn contact_address(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

/// Canonical form used for storing and comparing email addresses
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// The closed set of account roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Subscribes to publishers and journalists
    #[default]
    Reader,
    /// Writes articles and newsletters
    Journalist,
    /// Reviews and publishes content of their publishers
    Editor,
    /// Full access
    Admin,
}

impl UserRole {
    pub const ALL: [UserRole; 4] = [
        UserRole::Reader,
        UserRole::Journalist,
        UserRole::Editor,
        UserRole::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Reader => "reader",
            UserRole::Journalist => "journalist",
            UserRole::Editor => "editor",
            UserRole::Admin => "admin",
        }
    }

    /// Roles a publisher can offer through an invitation
    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Journalist | UserRole::Editor)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reader" => Ok(UserRole::Reader),
            "journalist" => Ok(UserRole::Journalist),
            "editor" => Ok(UserRole::Editor),
            "admin" => Ok(UserRole::Admin),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_normalizes_email() {
        let user = User::new(
            "carol".to_string(),
            Some("  Carol@Example.COM ".to_string()),
            "hash".to_string(),
            UserRole::Reader,
        );
        assert_eq!(user.email.as_deref(), Some("carol@example.com"));
        assert_eq!(user.contact_address(), Some("carol@example.com"));
    }

    #[test]
    fn test_blank_email_is_no_contact_address() {
        let user = User::new(
            "dana".to_string(),
            Some("   ".to_string()),
            "hash".to_string(),
            UserRole::Journalist,
        );
        assert!(user.email.is_none());
        assert!(user.contact_address().is_none());
    }

    #[test]
    fn test_role_parsing() {
        for role in UserRole::ALL {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }
        assert_eq!("EDITOR".parse::<UserRole>().unwrap(), UserRole::Editor);
        assert!("author".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_staff_roles() {
        assert!(UserRole::Journalist.is_staff());
        assert!(UserRole::Editor.is_staff());
        assert!(!UserRole::Reader.is_staff());
        assert!(!UserRole::Admin.is_staff());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("x".into(), None, "secret-hash".into(), UserRole::Reader);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(json.contains("\"role\":\"reader\""));
    }
}
