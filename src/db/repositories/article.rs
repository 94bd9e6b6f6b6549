//! Article repository
//!
//! A status change only touches rows whose status differs from the target,
//! which makes publish an edge-triggered event. `update` applies field edits
//! and an optional status change in one transaction.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{Article, ContentStatus, ListParams};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlConnection, Row, SqliteConnection};
use std::str::FromStr;
use std::sync::Arc;

const ARTICLE_COLUMNS: &str =
    "id, title, content, status, author_id, publisher_id, created_at, updated_at, published_at";

const UPDATE_FIELDS_SQL: &str =
    "UPDATE articles SET title = ?, content = ?, publisher_id = ?, updated_at = ? WHERE id = ?";

/// Entering `published` stamps `published_at`, any other status clears it
const TRANSITION_SQL: &str =
    "UPDATE articles SET status = ?, updated_at = ?, published_at = ? WHERE id = ? AND status <> ?";

#[async_trait]
pub trait ArticleRepository: Send + Sync {
    async fn create(&self, article: &Article) -> Result<Article>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>>;

    /// Persist title, content and publisher, then move into `status` if given.
    ///
    /// Both writes commit together. The flag is the `transition` result and is
    /// false when no status was given.
    async fn update(&self, article: &Article, status: Option<ContentStatus>) -> Result<(Article, bool)>;

    /// Move the article into `status`.
    ///
    /// Returns false when it already was in that status. Entering
    /// `Published` stamps `published_at`.
    async fn transition(&self, id: i64, status: ContentStatus) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Published articles, newest first
    async fn list_published(&self, params: &ListParams) -> Result<(Vec<Article>, i64)>;

    async fn list_by_author(&self, author_id: i64) -> Result<Vec<Article>>;

    /// Pending articles of every publisher the editor is a member of, oldest first
    async fn list_review_queue(&self, editor_id: i64) -> Result<Vec<Article>>;

    /// Every pending article, independent ones included, oldest first
    async fn list_pending(&self) -> Result<Vec<Article>>;

    /// Subset of `ids` that are published and satisfy the ownership filter
    async fn published_ids_for_publisher(&self, ids: &[i64], publisher_id: i64) -> Result<Vec<i64>>;

    async fn published_ids_for_author(&self, ids: &[i64], author_id: i64) -> Result<Vec<i64>>;
}

pub struct SqlxArticleRepository {
    pool: DynDatabasePool,
}

impl SqlxArticleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ArticleRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_where(&self, clause: &str, binds: &[i64]) -> Result<Vec<Article>> {
        let sql = format!("SELECT {} FROM articles {}", ARTICLE_COLUMNS, clause);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql);
                for bind in binds {
                    query = query.bind(*bind);
                }
                query
                    .fetch_all(sqlite(&self.pool)?)
                    .await
                    .context("Failed to query articles")?
                    .iter()
                    .map(row_to_article_sqlite)
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql);
                for bind in binds {
                    query = query.bind(*bind);
                }
                query
                    .fetch_all(mysql(&self.pool)?)
                    .await
                    .context("Failed to query articles")?
                    .iter()
                    .map(row_to_article_mysql)
                    .collect()
            }
        }
    }

    async fn filter_published(&self, ids: &[i64], owner_column: &str, owner: i64) -> Result<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id FROM articles WHERE status = 'published' AND {} = ? AND id IN ({}) ORDER BY id",
            owner_column, placeholders
        );
        let found = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql).bind(owner);
                for id in ids {
                    query = query.bind(*id);
                }
                query
                    .fetch_all(sqlite(&self.pool)?)
                    .await
                    .context("Failed to filter articles")?
                    .iter()
                    .map(|row| row.get("id"))
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql).bind(owner);
                for id in ids {
                    query = query.bind(*id);
                }
                query
                    .fetch_all(mysql(&self.pool)?)
                    .await
                    .context("Failed to filter articles")?
                    .iter()
                    .map(|row| row.get("id"))
                    .collect()
            }
        };
        Ok(found)
    }
}

#[async_trait]
impl ArticleRepository for SqlxArticleRepository {
    async fn create(&self, article: &Article) -> Result<Article> {
        let now = Utc::now();
        let published_at = (article.status == ContentStatus::Published).then_some(now);
        let sql = r#"
            INSERT INTO articles (title, content, status, author_id, publisher_id, created_at, updated_at, published_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#;
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&article.title)
                .bind(&article.content)
                .bind(article.status.as_str())
                .bind(article.author_id)
                .bind(article.publisher_id)
                .bind(now)
                .bind(now)
                .bind(published_at)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to create article")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&article.title)
                .bind(&article.content)
                .bind(article.status.as_str())
                .bind(article.author_id)
                .bind(article.publisher_id)
                .bind(now)
                .bind(now)
                .bind(published_at)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to create article")?
                .last_insert_id() as i64,
        };

        Ok(Article {
            id,
            created_at: now,
            updated_at: now,
            published_at,
            ..article.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        Ok(self.fetch_where("WHERE id = ?", &[id]).await?.into_iter().next())
    }

    async fn update(&self, article: &Article, status: Option<ContentStatus>) -> Result<(Article, bool)> {
        let now = Utc::now();
        let changed = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = sqlite(&self.pool)?
                    .begin()
                    .await
                    .context("Failed to begin transaction")?;
                update_fields_sqlite(&mut tx, article, now).await?;
                let changed = match status {
                    Some(status) => transition_sqlite(&mut tx, article.id, status, now).await?,
                    None => false,
                };
                tx.commit().await.context("Failed to commit article update")?;
                changed
            }
            DatabaseDriver::Mysql => {
                let mut tx = mysql(&self.pool)?
                    .begin()
                    .await
                    .context("Failed to begin transaction")?;
                update_fields_mysql(&mut tx, article, now).await?;
                let changed = match status {
                    Some(status) => transition_mysql(&mut tx, article.id, status, now).await?,
                    None => false,
                };
                tx.commit().await.context("Failed to commit article update")?;
                changed
            }
        };
        let stored = self
            .get_by_id(article.id)
            .await?
            .context("Article missing after update")?;
        Ok((stored, changed))
    }

    async fn transition(&self, id: i64, status: ContentStatus) -> Result<bool> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = sqlite(&self.pool)?
                    .acquire()
                    .await
                    .context("Failed to acquire connection")?;
                transition_sqlite(&mut conn, id, status, now).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = mysql(&self.pool)?
                    .acquire()
                    .await
                    .context("Failed to acquire connection")?;
                transition_mysql(&mut conn, id, status, now).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM articles WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to delete article")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to delete article")?;
            }
        }
        Ok(())
    }

    async fn list_published(&self, params: &ListParams) -> Result<(Vec<Article>, i64)> {
        let sql = format!(
            "SELECT {} FROM articles WHERE status = 'published' ORDER BY published_at DESC, id DESC LIMIT ? OFFSET ?",
            ARTICLE_COLUMNS
        );
        let count_sql = "SELECT COUNT(*) AS count FROM articles WHERE status = 'published'";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = sqlite(&self.pool)?;
                let rows = sqlx::query(&sql)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list articles")?;
                let total: i64 = sqlx::query(count_sql)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count articles")?
                    .get("count");
                let articles = rows.iter().map(row_to_article_sqlite).collect::<Result<_>>()?;
                Ok((articles, total))
            }
            DatabaseDriver::Mysql => {
                let pool = mysql(&self.pool)?;
                let rows = sqlx::query(&sql)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list articles")?;
                let total: i64 = sqlx::query(count_sql)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count articles")?
                    .get("count");
                let articles = rows.iter().map(row_to_article_mysql).collect::<Result<_>>()?;
                Ok((articles, total))
            }
        }
    }

    async fn list_by_author(&self, author_id: i64) -> Result<Vec<Article>> {
        self.fetch_where("WHERE author_id = ? ORDER BY created_at DESC, id DESC", &[author_id])
            .await
    }

    async fn list_review_queue(&self, editor_id: i64) -> Result<Vec<Article>> {
        let clause = "WHERE status = 'pending' AND publisher_id IN \
             (SELECT publisher_id FROM publisher_members WHERE user_id = ?) \
             ORDER BY created_at ASC, id ASC";
        self.fetch_where(clause, &[editor_id]).await
    }

    async fn list_pending(&self) -> Result<Vec<Article>> {
        self.fetch_where("WHERE status = 'pending' ORDER BY created_at ASC, id ASC", &[])
            .await
    }

    async fn published_ids_for_publisher(&self, ids: &[i64], publisher_id: i64) -> Result<Vec<i64>> {
        self.filter_published(ids, "publisher_id", publisher_id).await
    }

    async fn published_ids_for_author(&self, ids: &[i64], author_id: i64) -> Result<Vec<i64>> {
        self.filter_published(ids, "author_id", author_id).await
    }
}

async fn update_fields_sqlite(conn: &mut SqliteConnection, article: &Article, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(UPDATE_FIELDS_SQL)
        .bind(&article.title)
        .bind(&article.content)
        .bind(article.publisher_id)
        .bind(now)
        .bind(article.id)
        .execute(conn)
        .await
        .context("Failed to update article")?;
    Ok(())
}

async fn transition_sqlite(
    conn: &mut SqliteConnection,
    id: i64,
    status: ContentStatus,
    now: DateTime<Utc>,
) -> Result<bool> {
    let published_at = (status == ContentStatus::Published).then_some(now);
    let affected = sqlx::query(TRANSITION_SQL)
        .bind(status.as_str())
        .bind(now)
        .bind(published_at)
        .bind(id)
        .bind(status.as_str())
        .execute(conn)
        .await
        .context("Failed to change article status")?
        .rows_affected();
    Ok(affected == 1)
}

async fn update_fields_mysql(conn: &mut MySqlConnection, article: &Article, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(UPDATE_FIELDS_SQL)
        .bind(&article.title)
        .bind(&article.content)
        .bind(article.publisher_id)
        .bind(now)
        .bind(article.id)
        .execute(conn)
        .await
        .context("Failed to update article")?;
    Ok(())
}

async fn transition_mysql(
    conn: &mut MySqlConnection,
    id: i64,
    status: ContentStatus,
    now: DateTime<Utc>,
) -> Result<bool> {
    let published_at = (status == ContentStatus::Published).then_some(now);
    let affected = sqlx::query(TRANSITION_SQL)
        .bind(status.as_str())
        .bind(now)
        .bind(published_at)
        .bind(id)
        .bind(status.as_str())
        .execute(conn)
        .await
        .context("Failed to change article status")?
        .rows_affected();
    Ok(affected == 1)
}

fn row_to_article_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Article> {
    let status: String = row.get("status");
    Ok(Article {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        status: ContentStatus::from_str(&status)
            .with_context(|| format!("Invalid status in database: {}", status))?,
        author_id: row.get("author_id"),
        publisher_id: row.get("publisher_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        published_at: row.get("published_at"),
    })
}

fn row_to_article_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Article> {
    let status: String = row.get("status");
    Ok(Article {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        status: ContentStatus::from_str(&status)
            .with_context(|| format!("Invalid status in database: {}", status))?,
        author_id: row.get("author_id"),
        publisher_id: row.get("publisher_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        published_at: row.get("published_at"),
    })
}

#[cfg(test)]
pub(crate) fn draft(title: &str, author_id: i64, publisher_id: Option<i64>) -> Article {
    let now = Utc::now();
    Article {
        id: 0,
        title: title.to_string(),
        content: format!("{} body", title),
        status: ContentStatus::Draft,
        author_id,
        publisher_id,
        created_at: now,
        updated_at: now,
        published_at: None,
    }
}
