//! Subscription repository
//!
//! Reader subscriptions to publishers and to individual journalists, the
//! audience lookups used by the publish fan-out, and the subscribed feed.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::repositories::user::{row_to_user_mysql, row_to_user_sqlite, JOINED_USER_COLUMNS};
use crate::db::DynDatabasePool;
use crate::models::{FeedArticle, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

/// Published articles whose publisher or author the user follows. One row per article.
const FEED_SQL: &str = r#"
    SELECT a.title, a.content, a.author_id, a.publisher_id
    FROM articles a
    WHERE a.status = 'published'
      AND (
        a.publisher_id IN (SELECT publisher_id FROM publisher_subscriptions WHERE user_id = ?)
        OR a.author_id IN (SELECT journalist_id FROM journalist_subscriptions WHERE user_id = ?)
      )
    ORDER BY a.created_at DESC, a.id DESC
"#;

/// Which subscription table a statement targets
#[derive(Debug, Clone, Copy)]
enum Target {
    Publisher,
    Journalist,
}

impl Target {
    fn table(self) -> &'static str {
        match self {
            Target::Publisher => "publisher_subscriptions",
            Target::Journalist => "journalist_subscriptions",
        }
    }

    fn column(self) -> &'static str {
        match self {
            Target::Publisher => "publisher_id",
            Target::Journalist => "journalist_id",
        }
    }
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Returns false when the subscription already existed
    async fn subscribe_publisher(&self, user_id: i64, publisher_id: i64) -> Result<bool>;

    async fn unsubscribe_publisher(&self, user_id: i64, publisher_id: i64) -> Result<bool>;

    async fn subscribe_journalist(&self, user_id: i64, journalist_id: i64) -> Result<bool>;

    async fn unsubscribe_journalist(&self, user_id: i64, journalist_id: i64) -> Result<bool>;

    /// Publisher ids the user follows
    async fn subscribed_publishers(&self, user_id: i64) -> Result<Vec<i64>>;

    /// Journalist ids the user follows
    async fn subscribed_journalists(&self, user_id: i64) -> Result<Vec<i64>>;

    async fn publisher_subscribers(&self, publisher_id: i64) -> Result<Vec<User>>;

    async fn journalist_subscribers(&self, journalist_id: i64) -> Result<Vec<User>>;

    /// Published articles from followed publishers and journalists, newest first
    async fn feed_for(&self, user_id: i64) -> Result<Vec<FeedArticle>>;
}

pub struct SqlxSubscriptionRepository {
    pool: DynDatabasePool,
}

impl SqlxSubscriptionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SubscriptionRepository> {
        Arc::new(Self::new(pool))
    }

    async fn insert(&self, target: Target, user_id: i64, target_id: i64) -> Result<bool> {
        let verb = match self.pool.driver() {
            DatabaseDriver::Sqlite => "INSERT OR IGNORE",
            DatabaseDriver::Mysql => "INSERT IGNORE",
        };
        let sql = format!(
            "{} INTO {} (user_id, {}, created_at) VALUES (?, ?, ?)",
            verb,
            target.table(),
            target.column()
        );
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(user_id)
                .bind(target_id)
                .bind(now)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to subscribe")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(user_id)
                .bind(target_id)
                .bind(now)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to subscribe")?
                .rows_affected(),
        };
        Ok(affected == 1)
    }

    async fn remove(&self, target: Target, user_id: i64, target_id: i64) -> Result<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE user_id = ? AND {} = ?",
            target.table(),
            target.column()
        );
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(user_id)
                .bind(target_id)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to unsubscribe")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(user_id)
                .bind(target_id)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to unsubscribe")?
                .rows_affected(),
        };
        Ok(affected == 1)
    }

    async fn targets_of(&self, target: Target, user_id: i64) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT {col} FROM {} WHERE user_id = ? ORDER BY {col}",
            target.table(),
            col = target.column()
        );
        let ids = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(user_id)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to list subscriptions")?
                .iter()
                .map(|row| row.get(target.column()))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(user_id)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to list subscriptions")?
                .iter()
                .map(|row| row.get(target.column()))
                .collect(),
        };
        Ok(ids)
    }

    async fn subscribers_of(&self, target: Target, target_id: i64) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM {} s JOIN users u ON u.id = s.user_id WHERE s.{} = ? ORDER BY u.id",
            JOINED_USER_COLUMNS,
            target.table(),
            target.column()
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(target_id)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to list subscribers")?
                .iter()
                .map(row_to_user_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(target_id)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to list subscribers")?
                .iter()
                .map(row_to_user_mysql)
                .collect(),
        }
    }
}

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn subscribe_publisher(&self, user_id: i64, publisher_id: i64) -> Result<bool> {
        self.insert(Target::Publisher, user_id, publisher_id).await
    }

    async fn unsubscribe_publisher(&self, user_id: i64, publisher_id: i64) -> Result<bool> {
        self.remove(Target::Publisher, user_id, publisher_id).await
    }

    async fn subscribe_journalist(&self, user_id: i64, journalist_id: i64) -> Result<bool> {
        self.insert(Target::Journalist, user_id, journalist_id).await
    }

    async fn unsubscribe_journalist(&self, user_id: i64, journalist_id: i64) -> Result<bool> {
        self.remove(Target::Journalist, user_id, journalist_id).await
    }

    async fn subscribed_publishers(&self, user_id: i64) -> Result<Vec<i64>> {
        self.targets_of(Target::Publisher, user_id).await
    }

    async fn subscribed_journalists(&self, user_id: i64) -> Result<Vec<i64>> {
        self.targets_of(Target::Journalist, user_id).await
    }

    async fn publisher_subscribers(&self, publisher_id: i64) -> Result<Vec<User>> {
        self.subscribers_of(Target::Publisher, publisher_id).await
    }

    async fn journalist_subscribers(&self, journalist_id: i64) -> Result<Vec<User>> {
        self.subscribers_of(Target::Journalist, journalist_id).await
    }

    async fn feed_for(&self, user_id: i64) -> Result<Vec<FeedArticle>> {
        let feed = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(FEED_SQL)
                .bind(user_id)
                .bind(user_id)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to load subscribed articles")?
                .iter()
                .map(|row| FeedArticle {
                    title: row.get("title"),
                    content: row.get("content"),
                    author: row.get("author_id"),
                    publisher: row.get("publisher_id"),
                })
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(FEED_SQL)
                .bind(user_id)
                .bind(user_id)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to load subscribed articles")?
                .iter()
                .map(|row| FeedArticle {
                    title: row.get("title"),
                    content: row.get("content"),
                    author: row.get("author_id"),
                    publisher: row.get("publisher_id"),
                })
                .collect(),
        };
        Ok(feed)
    }
}
