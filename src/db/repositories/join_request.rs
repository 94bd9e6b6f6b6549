//! Join request repository

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::repositories::publisher::{INSERT_MEMBER_MYSQL, INSERT_MEMBER_SQLITE};
use crate::db::DynDatabasePool;
use crate::models::{JoinRequest, JoinRequestStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const JOIN_REQUEST_COLUMNS: &str =
    "id, user_id, publisher_id, status, decided_by, created_at, decided_at";

const DECIDE_SQL: &str =
    "UPDATE join_requests SET status = ?, decided_by = ?, decided_at = ? WHERE id = ? AND status = 'pending'";

#[async_trait]
pub trait JoinRequestRepository: Send + Sync {
    /// Insert a pending request, or return the one already stored for the pair
    async fn create_or_get(&self, user_id: i64, publisher_id: i64) -> Result<JoinRequest>;

    async fn get_by_id(&self, id: i64) -> Result<Option<JoinRequest>>;

    async fn list_for_publisher(
        &self,
        publisher_id: i64,
        status: Option<JoinRequestStatus>,
    ) -> Result<Vec<JoinRequest>>;

    /// Move a pending request to `status`; an approval also adds the membership
    /// in the same transaction. Returns false if the request was no longer pending.
    async fn decide(
        &self,
        request: &JoinRequest,
        status: JoinRequestStatus,
        decided_by: i64,
    ) -> Result<bool>;
}

pub struct SqlxJoinRequestRepository {
    pool: DynDatabasePool,
}

impl SqlxJoinRequestRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn JoinRequestRepository> {
        Arc::new(Self::new(pool))
    }

    async fn get_by_pair(&self, user_id: i64, publisher_id: i64) -> Result<Option<JoinRequest>> {
        let sql = format!(
            "SELECT {} FROM join_requests WHERE user_id = ? AND publisher_id = ?",
            JOIN_REQUEST_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(user_id)
                .bind(publisher_id)
                .fetch_optional(sqlite(&self.pool)?)
                .await
                .context("Failed to get join request")?
                .as_ref()
                .map(row_to_join_request_sqlite)
                .transpose(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(user_id)
                .bind(publisher_id)
                .fetch_optional(mysql(&self.pool)?)
                .await
                .context("Failed to get join request")?
                .as_ref()
                .map(row_to_join_request_mysql)
                .transpose(),
        }
    }
}

#[async_trait]
impl JoinRequestRepository for SqlxJoinRequestRepository {
    async fn create_or_get(&self, user_id: i64, publisher_id: i64) -> Result<JoinRequest> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(
                    "INSERT OR IGNORE INTO join_requests (user_id, publisher_id, status, created_at) VALUES (?, ?, 'pending', ?)",
                )
                .bind(user_id)
                .bind(publisher_id)
                .bind(now)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to create join request")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(
                    "INSERT IGNORE INTO join_requests (user_id, publisher_id, status, created_at) VALUES (?, ?, 'pending', ?)",
                )
                .bind(user_id)
                .bind(publisher_id)
                .bind(now)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to create join request")?;
            }
        }

        self.get_by_pair(user_id, publisher_id)
            .await?
            .context("Join request missing after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<JoinRequest>> {
        let sql = format!("SELECT {} FROM join_requests WHERE id = ?", JOIN_REQUEST_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(sqlite(&self.pool)?)
                .await
                .context("Failed to get join request by ID")?
                .as_ref()
                .map(row_to_join_request_sqlite)
                .transpose(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(mysql(&self.pool)?)
                .await
                .context("Failed to get join request by ID")?
                .as_ref()
                .map(row_to_join_request_mysql)
                .transpose(),
        }
    }

    async fn list_for_publisher(
        &self,
        publisher_id: i64,
        status: Option<JoinRequestStatus>,
    ) -> Result<Vec<JoinRequest>> {
        let mut sql = format!(
            "SELECT {} FROM join_requests WHERE publisher_id = ?",
            JOIN_REQUEST_COLUMNS
        );
        if status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC");

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql).bind(publisher_id);
                if let Some(status) = status {
                    query = query.bind(status.as_str());
                }
                query
                    .fetch_all(sqlite(&self.pool)?)
                    .await
                    .context("Failed to list join requests")?
                    .iter()
                    .map(row_to_join_request_sqlite)
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql).bind(publisher_id);
                if let Some(status) = status {
                    query = query.bind(status.as_str());
                }
                query
                    .fetch_all(mysql(&self.pool)?)
                    .await
                    .context("Failed to list join requests")?
                    .iter()
                    .map(row_to_join_request_mysql)
                    .collect()
            }
        }
    }

    async fn decide(
        &self,
        request: &JoinRequest,
        status: JoinRequestStatus,
        decided_by: i64,
    ) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                decide_sqlite(sqlite(&self.pool)?, request, status, decided_by).await
            }
            DatabaseDriver::Mysql => decide_mysql(mysql(&self.pool)?, request, status, decided_by).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn decide_sqlite(
    pool: &SqlitePool,
    request: &JoinRequest,
    status: JoinRequestStatus,
    decided_by: i64,
) -> Result<bool> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let changed = sqlx::query(DECIDE_SQL)
        .bind(status.as_str())
        .bind(decided_by)
        .bind(now)
        .bind(request.id)
        .execute(&mut *tx)
        .await
        .context("Failed to decide join request")?
        .rows_affected();
    if changed != 1 {
        tx.rollback().await.context("Failed to roll back")?;
        return Ok(false);
    }

    if status == JoinRequestStatus::Approved {
        sqlx::query(INSERT_MEMBER_SQLITE)
            .bind(request.user_id)
            .bind(request.publisher_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to add member")?;
    }

    tx.commit().await.context("Failed to commit join request")?;
    Ok(true)
}

fn row_to_join_request_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<JoinRequest> {
    let status: String = row.get("status");
    Ok(JoinRequest {
        id: row.get("id"),
        user_id: row.get("user_id"),
        publisher_id: row.get("publisher_id"),
        status: JoinRequestStatus::from_str(&status)?,
        decided_by: row.get("decided_by"),
        created_at: row.get("created_at"),
        decided_at: row.get("decided_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn decide_mysql(
    pool: &MySqlPool,
    request: &JoinRequest,
    status: JoinRequestStatus,
    decided_by: i64,
) -> Result<bool> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let changed = sqlx::query(DECIDE_SQL)
        .bind(status.as_str())
        .bind(decided_by)
        .bind(now)
        .bind(request.id)
        .execute(&mut *tx)
        .await
        .context("Failed to decide join request")?
        .rows_affected();
    if changed != 1 {
        tx.rollback().await.context("Failed to roll back")?;
        return Ok(false);
    }

    if status == JoinRequestStatus::Approved {
        sqlx::query(INSERT_MEMBER_MYSQL)
            .bind(request.user_id)
            .bind(request.publisher_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to add member")?;
    }

    tx.commit().await.context("Failed to commit join request")?;
    Ok(true)
}

fn row_to_join_request_mysql(row: &sqlx::mysql::MySqlRow) -> Result<JoinRequest> {
    let status: String = row.get("status");
    Ok(JoinRequest {
        id: row.get("id"),
        user_id: row.get("user_id"),
        publisher_id: row.get("publisher_id"),
        status: JoinRequestStatus::from_str(&status)?,
        decided_by: row.get("decided_by"),
        created_at: row.get("created_at"),
        decided_at: row.get("decided_at"),
    })
}
