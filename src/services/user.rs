//! User service
//!
//! Registration, login/logout and session validation, plus the admin-only
//! role management. The very first account registered becomes the admin;
//! afterwards self-registration may only pick reader, journalist or editor.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{normalize_email, Session, User, UserRole};
use crate::services::authorization::{require, Action};
use crate::services::email::is_deliverable_address;
use crate::services::error::ServiceError;
use crate::services::password::{hash_password, verify_password, MIN_PASSWORD_LEN};
use anyhow::Context;
use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

/// Default session lifetime in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

static USERNAME_RE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{3,50}$"));

/// Error types for authentication and account operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Session not found")]
    SessionNotFound,

    /// Too many login attempts
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    /// Register a new account.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a malformed username, email or short password,
    ///   or a role other than reader/journalist/editor
    /// - `UserExists` if the username or email is taken
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        validate_register_input(&input)?;

        if self
            .user_repo
            .get_by_username(&input.username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                input.username
            )));
        }

        let email = input
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty());
        if let Some(ref email) = email {
            if self
                .user_repo
                .get_by_email(email)
                .await
                .context("Failed to check email")?
                .is_some()
            {
                return Err(UserServiceError::UserExists(format!(
                    "Email '{}' is already registered",
                    email
                )));
            }
        }

        let role = if self.is_first_user().await? {
            UserRole::Admin
        } else {
            input.role
        };

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(input.username, email, password_hash, role);
        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!(user_id = created.id, role = %created.role, "User registered");
        Ok(created)
    }

    /// Verify credentials and open a session.
    ///
    /// Unknown users and wrong passwords produce the same error.
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid username or password".to_string());

        let user = self
            .find_user_by_username_or_email(&input.username_or_email)
            .await?
            .ok_or_else(invalid)?;

        if !verify_password(&input.password, &user.password_hash).context("Failed to verify password")? {
            return Err(invalid());
        }

        let session = Session::new(user.id, Duration::days(self.session_expiration_days));
        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        tracing::debug!(user_id = user.id, "Session opened");
        Ok(created)
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Missing and expired sessions yield `None`; expired ones are removed.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        else {
            return Ok(None);
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to remove expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self.user_repo.count().await.context("Failed to count users")?;
        Ok(count == 0)
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    /// Paginated user listing for administrators
    pub async fn list_users(
        &self,
        actor: &User,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<User>, i64), ServiceError> {
        require(actor, Action::ManageUsers)?;
        Ok(self.user_repo.list(page, per_page).await?)
    }

    /// Change another user's role; only admins may do this
    pub async fn update_role(&self, actor: &User, user_id: i64, role: UserRole) -> Result<User, ServiceError> {
        require(actor, Action::ManageUsers)?;
        if actor.id == user_id && role != UserRole::Admin {
            return Err(ServiceError::conflict("Admins cannot demote themselves"));
        }
        let mut user = self
            .user_repo
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", user_id))?;

        self.user_repo.update_role(user_id, role).await?;
        tracing::info!(user_id, from = %user.role, to = %role, actor = actor.id, "Role changed");
        user.role = role;
        Ok(user)
    }

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_username(username_or_email)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        Ok(self
            .user_repo
            .get_by_email(&normalize_email(username_or_email))
            .await
            .context("Failed to get user by email")?)
    }
}

fn validate_register_input(input: &RegisterInput) -> Result<(), UserServiceError> {
    let username_re = USERNAME_RE
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Username pattern failed to compile: {}", e))?;
    if !username_re.is_match(&input.username) {
        return Err(UserServiceError::ValidationError(
            "Username must be 3-50 characters of letters, digits, '_' or '-'".to_string(),
        ));
    }
    if let Some(email) = input.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        if !is_deliverable_address(email) {
            return Err(UserServiceError::ValidationError("Invalid email format".to_string()));
        }
    }
    if input.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(UserServiceError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if input.role == UserRole::Admin {
        return Err(UserServiceError::ValidationError(
            "Role must be reader, journalist or editor".to_string(),
        ));
    }
    Ok(())
}

/// Input for user registration
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
    #[serde(default)]
    pub role: UserRole,
}

impl RegisterInput {
    pub fn new(username: impl Into<String>, email: Option<&str>, password: impl Into<String>, role: UserRole) -> Self {
        Self {
            username: username.into(),
            email: email.map(str::to_string),
            password: password.into(),
            role,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}
