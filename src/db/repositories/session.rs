//! Session repository
//!
//! Database operations for login sessions.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete all sessions for a user
    async fn delete_by_user(&self, user_id: i64) -> Result<()>;

    /// Delete expired sessions, returns the number removed
    async fn delete_expired(&self) -> Result<i64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }

    async fn execute(&self, sql: &str, bind: Bind<'_>) -> Result<u64> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let query = sqlx::query(sql);
                let query = match bind {
                    Bind::Text(v) => query.bind(v.to_string()),
                    Bind::Id(v) => query.bind(v),
                    Bind::Now => query.bind(Utc::now()),
                };
                query.execute(sqlite(&self.pool)?).await?.rows_affected()
            }
            DatabaseDriver::Mysql => {
                let query = sqlx::query(sql);
                let query = match bind {
                    Bind::Text(v) => query.bind(v.to_string()),
                    Bind::Id(v) => query.bind(v),
                    Bind::Now => query.bind(Utc::now()),
                };
                query.execute(mysql(&self.pool)?).await?.rows_affected()
            }
        };
        Ok(affected)
    }
}

/// Single parameter of a session delete statement
enum Bind<'a> {
    Text(&'a str),
    Id(i64),
    Now,
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        let sql = "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&session.id)
                    .bind(session.user_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to create session")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&session.id)
                    .bind(session.user_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to create session")?;
            }
        }
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let sql = "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?";
        let session = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .fetch_optional(sqlite(&self.pool)?)
                .await
                .context("Failed to get session by ID")?
                .map(|row| Session {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    expires_at: row.get("expires_at"),
                    created_at: row.get("created_at"),
                }),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .fetch_optional(mysql(&self.pool)?)
                .await
                .context("Failed to get session by ID")?
                .map(|row| Session {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    expires_at: row.get("expires_at"),
                    created_at: row.get("created_at"),
                }),
        };
        Ok(session)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.execute("DELETE FROM sessions WHERE id = ?", Bind::Text(id))
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<()> {
        self.execute("DELETE FROM sessions WHERE user_id = ?", Bind::Id(user_id))
            .await
            .context("Failed to delete sessions by user")?;
        Ok(())
    }

    async fn delete_expired(&self) -> Result<i64> {
        let removed = self
            .execute("DELETE FROM sessions WHERE expires_at < ?", Bind::Now)
            .await
            .context("Failed to delete expired sessions")?;
        Ok(removed as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{seed_user, setup_pool};
    use crate::models::UserRole;
    use chrono::Duration;

    #[tokio::test]
    async fn test_create_and_get_session() {
        let pool = setup_pool().await;
        let user = seed_user(&pool, "alice", None, UserRole::Reader).await;
        let repo = SqlxSessionRepository::new(pool);

        let session = Session::new(user.id, Duration::days(7));
        repo.create(&session).await.expect("Failed to create session");

        let fetched = repo
            .get_by_id(&session.id)
            .await
            .expect("Failed to get session")
            .expect("Session should exist");
        assert_eq!(fetched.user_id, user.id);
        assert!(!fetched.is_expired());

        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_session_and_by_user() {
        let pool = setup_pool().await;
        let user = seed_user(&pool, "alice", None, UserRole::Reader).await;
        let repo = SqlxSessionRepository::new(pool);

        let first = Session::new(user.id, Duration::days(1));
        let second = Session::new(user.id, Duration::days(1));
        repo.create(&first).await.unwrap();
        repo.create(&second).await.unwrap();

        repo.delete(&first.id).await.expect("Failed to delete session");
        assert!(repo.get_by_id(&first.id).await.unwrap().is_none());
        assert!(repo.get_by_id(&second.id).await.unwrap().is_some());

        repo.delete_by_user(user.id).await.expect("Failed to delete sessions");
        assert!(repo.get_by_id(&second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_sessions() {
        let pool = setup_pool().await;
        let user = seed_user(&pool, "alice", None, UserRole::Reader).await;
        let repo = SqlxSessionRepository::new(pool);

        let expired = Session::new(user.id, Duration::days(-1));
        let live = Session::new(user.id, Duration::days(1));
        repo.create(&expired).await.unwrap();
        repo.create(&live).await.unwrap();

        let removed = repo.delete_expired().await.expect("Failed to purge");
        assert_eq!(removed, 1);
        assert!(repo.get_by_id(&live.id).await.unwrap().is_some());
    }
}
