//! Invitation repository
//!
//! Acceptance runs in one transaction: the conditional `accepted = 0` update
//! must claim exactly one row, so a token can be consumed once even under
//! concurrent requests.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::repositories::publisher::{INSERT_MEMBER_MYSQL, INSERT_MEMBER_SQLITE};
use crate::db::DynDatabasePool;
use crate::models::{CollaborationInvitation, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const INVITATION_COLUMNS: &str =
    "id, email, publisher_id, role, token, accepted, invited_by, created_at, accepted_at";

const CLAIM_SQL: &str =
    "UPDATE invitations SET accepted = ?, accepted_at = ? WHERE id = ? AND accepted = ?";

const SET_ROLE_SQL: &str = "UPDATE users SET role = ?, updated_at = ? WHERE id = ?";

#[async_trait]
pub trait InvitationRepository: Send + Sync {
    async fn create(&self, invitation: &CollaborationInvitation) -> Result<CollaborationInvitation>;

    /// Resolve a token that has not been used yet
    async fn get_pending_by_token(&self, token: &str) -> Result<Option<CollaborationInvitation>>;

    /// Pending invitations addressed to a normalized email
    async fn list_pending_for_email(&self, email: &str) -> Result<Vec<CollaborationInvitation>>;

    /// Consume the invitation for `user_id`: mark it accepted, add the
    /// membership and overwrite the user's role.
    ///
    /// Returns false when the invitation had already been accepted.
    async fn accept(&self, invitation: &CollaborationInvitation, user_id: i64) -> Result<bool>;
}

pub struct SqlxInvitationRepository {
    pool: DynDatabasePool,
}

impl SqlxInvitationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn InvitationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl InvitationRepository for SqlxInvitationRepository {
    async fn create(&self, invitation: &CollaborationInvitation) -> Result<CollaborationInvitation> {
        let sql = r#"
            INSERT INTO invitations (email, publisher_id, role, token, accepted, invited_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
        "#;
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&invitation.email)
                .bind(invitation.publisher_id)
                .bind(invitation.role.as_str())
                .bind(&invitation.token)
                .bind(false)
                .bind(invitation.invited_by)
                .bind(invitation.created_at)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to create invitation")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&invitation.email)
                .bind(invitation.publisher_id)
                .bind(invitation.role.as_str())
                .bind(&invitation.token)
                .bind(false)
                .bind(invitation.invited_by)
                .bind(invitation.created_at)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to create invitation")?
                .last_insert_id() as i64,
        };

        Ok(CollaborationInvitation {
            id,
            accepted: false,
            accepted_at: None,
            ..invitation.clone()
        })
    }

    async fn get_pending_by_token(&self, token: &str) -> Result<Option<CollaborationInvitation>> {
        let sql = format!(
            "SELECT {} FROM invitations WHERE token = ? AND accepted = ?",
            INVITATION_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(token)
                .bind(false)
                .fetch_optional(sqlite(&self.pool)?)
                .await
                .context("Failed to get invitation by token")?
                .as_ref()
                .map(row_to_invitation_sqlite)
                .transpose(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(token)
                .bind(false)
                .fetch_optional(mysql(&self.pool)?)
                .await
                .context("Failed to get invitation by token")?
                .as_ref()
                .map(row_to_invitation_mysql)
                .transpose(),
        }
    }

    async fn list_pending_for_email(&self, email: &str) -> Result<Vec<CollaborationInvitation>> {
        let sql = format!(
            "SELECT {} FROM invitations WHERE email = ? AND accepted = ? ORDER BY created_at DESC, id DESC",
            INVITATION_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(email)
                .bind(false)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to list invitations")?
                .iter()
                .map(row_to_invitation_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(email)
                .bind(false)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to list invitations")?
                .iter()
                .map(row_to_invitation_mysql)
                .collect(),
        }
    }

    async fn accept(&self, invitation: &CollaborationInvitation, user_id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => accept_sqlite(sqlite(&self.pool)?, invitation, user_id).await,
            DatabaseDriver::Mysql => accept_mysql(mysql(&self.pool)?, invitation, user_id).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn accept_sqlite(
    pool: &SqlitePool,
    invitation: &CollaborationInvitation,
    user_id: i64,
) -> Result<bool> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let claimed = sqlx::query(CLAIM_SQL)
        .bind(true)
        .bind(now)
        .bind(invitation.id)
        .bind(false)
        .execute(&mut *tx)
        .await
        .context("Failed to claim invitation")?
        .rows_affected();
    if claimed != 1 {
        tx.rollback().await.context("Failed to roll back")?;
        return Ok(false);
    }

    sqlx::query(INSERT_MEMBER_SQLITE)
        .bind(user_id)
        .bind(invitation.publisher_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to add member")?;

    sqlx::query(SET_ROLE_SQL)
        .bind(invitation.role.as_str())
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update user role")?;

    tx.commit().await.context("Failed to commit invitation")?;
    Ok(true)
}

fn row_to_invitation_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<CollaborationInvitation> {
    let role: String = row.get("role");
    Ok(CollaborationInvitation {
        id: row.get("id"),
        email: row.get("email"),
        publisher_id: row.get("publisher_id"),
        role: UserRole::from_str(&role)?,
        token: row.get("token"),
        accepted: row.get("accepted"),
        invited_by: row.get("invited_by"),
        created_at: row.get("created_at"),
        accepted_at: row.get("accepted_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn accept_mysql(
    pool: &MySqlPool,
    invitation: &CollaborationInvitation,
    user_id: i64,
) -> Result<bool> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let claimed = sqlx::query(CLAIM_SQL)
        .bind(true)
        .bind(now)
        .bind(invitation.id)
        .bind(false)
        .execute(&mut *tx)
        .await
        .context("Failed to claim invitation")?
        .rows_affected();
    if claimed != 1 {
        tx.rollback().await.context("Failed to roll back")?;
        return Ok(false);
    }

    sqlx::query(INSERT_MEMBER_MYSQL)
        .bind(user_id)
        .bind(invitation.publisher_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to add member")?;

    sqlx::query(SET_ROLE_SQL)
        .bind(invitation.role.as_str())
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update user role")?;

    tx.commit().await.context("Failed to commit invitation")?;
    Ok(true)
}

fn row_to_invitation_mysql(row: &sqlx::mysql::MySqlRow) -> Result<CollaborationInvitation> {
    let role: String = row.get("role");
    Ok(CollaborationInvitation {
        id: row.get("id"),
        email: row.get("email"),
        publisher_id: row.get("publisher_id"),
        role: UserRole::from_str(&role)?,
        token: row.get("token"),
        accepted: row.get("accepted"),
        invited_by: row.get("invited_by"),
        created_at: row.get("created_at"),
        accepted_at: row.get("accepted_at"),
    })
}
