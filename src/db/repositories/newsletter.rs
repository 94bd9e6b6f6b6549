//! Newsletter repository
//!
//! Newsletters share the article status lifecycle and add direct
//! subscriptions plus issues. An issue's featured articles live in
//! `newsletter_issue_articles` and are written in the same transaction
//! as the issue itself.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::repositories::user::{row_to_user_mysql, row_to_user_sqlite, JOINED_USER_COLUMNS};
use crate::db::DynDatabasePool;
use crate::models::{ContentStatus, CreateIssueInput, ListParams, Newsletter, NewsletterIssue, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlConnection, Row, SqliteConnection};
use std::str::FromStr;
use std::sync::Arc;

const NEWSLETTER_COLUMNS: &str = "id, title, description, subject, status, author_id, publisher_id, \
     is_active, created_at, updated_at, published_at";

const UPDATE_FIELDS_SQL: &str = "UPDATE newsletters SET title = ?, description = ?, subject = ?, \
     publisher_id = ?, is_active = ?, updated_at = ? WHERE id = ?";

const TRANSITION_SQL: &str =
    "UPDATE newsletters SET status = ?, updated_at = ?, published_at = ? WHERE id = ? AND status <> ?";

const ISSUE_COLUMNS: &str = "id, newsletter_id, subject, body, is_draft, sent_at, created_at";

const FEATURED_SQL: &str =
    "SELECT article_id FROM newsletter_issue_articles WHERE issue_id = ? ORDER BY article_id";

#[async_trait]
pub trait NewsletterRepository: Send + Sync {
    async fn create(&self, newsletter: &Newsletter) -> Result<Newsletter>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Newsletter>>;

    /// Persist everything except status, then move into `status` if given.
    /// Both writes commit together, as with articles.
    async fn update(&self, newsletter: &Newsletter, status: Option<ContentStatus>) -> Result<(Newsletter, bool)>;

    /// Same contract as the article transition: false when nothing changed
    async fn transition(&self, id: i64, status: ContentStatus) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn list_published(&self, params: &ListParams) -> Result<(Vec<Newsletter>, i64)>;

    async fn list_by_author(&self, author_id: i64) -> Result<Vec<Newsletter>>;

    async fn list_review_queue(&self, editor_id: i64) -> Result<Vec<Newsletter>>;

    /// Every pending newsletter, oldest first
    async fn list_pending(&self) -> Result<Vec<Newsletter>>;

    /// Returns false when the user was already subscribed
    async fn subscribe(&self, newsletter_id: i64, user_id: i64) -> Result<bool>;

    /// Returns false when there was no subscription
    async fn unsubscribe(&self, newsletter_id: i64, user_id: i64) -> Result<bool>;

    async fn subscribers(&self, newsletter_id: i64) -> Result<Vec<User>>;

    async fn create_issue(&self, newsletter_id: i64, input: &CreateIssueInput) -> Result<NewsletterIssue>;

    async fn get_issue(&self, issue_id: i64) -> Result<Option<NewsletterIssue>>;

    /// Issues of a newsletter, newest first
    async fn list_issues(&self, newsletter_id: i64) -> Result<Vec<NewsletterIssue>>;

    /// Flip a draft issue to sent. False when it was already sent.
    async fn mark_issue_sent(&self, issue_id: i64) -> Result<bool>;
}

pub struct SqlxNewsletterRepository {
    pool: DynDatabasePool,
}

impl SqlxNewsletterRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NewsletterRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_where(&self, clause: &str, binds: &[i64]) -> Result<Vec<Newsletter>> {
        let sql = format!("SELECT {} FROM newsletters {}", NEWSLETTER_COLUMNS, clause);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql);
                for bind in binds {
                    query = query.bind(*bind);
                }
                query
                    .fetch_all(sqlite(&self.pool)?)
                    .await
                    .context("Failed to query newsletters")?
                    .iter()
                    .map(row_to_newsletter_sqlite)
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
                    .context("Failed to query newsletters")?
                    .iter()
                    .map(row_to_newsletter_mysql)
                    .collect()
            }
        }
    }

    /// Run an insert taking two ids and a timestamp
    async fn insert_pair(&self, sql: &str, first: i64, second: i64) -> Result<u64> {
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(first)
                .bind(second)
                .bind(now)
                .execute(sqlite(&self.pool)?)
                .await?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(first)
                .bind(second)
                .bind(now)
                .execute(mysql(&self.pool)?)
                .await?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn featured_ids(&self, issue_id: i64) -> Result<Vec<i64>> {
        let ids = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(FEATURED_SQL)
                .bind(issue_id)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to load featured articles")?
                .iter()
                .map(|row| row.get("article_id"))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(FEATURED_SQL)
                .bind(issue_id)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to load featured articles")?
                .iter()
                .map(|row| row.get("article_id"))
                .collect(),
        };
        Ok(ids)
    }

    async fn fetch_issues(&self, clause: &str, bind: i64) -> Result<Vec<NewsletterIssue>> {
        let sql = format!("SELECT {} FROM newsletter_issues {}", ISSUE_COLUMNS, clause);
        let mut issues: Vec<NewsletterIssue> = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(bind)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to query newsletter issues")?
                .iter()
                .map(|row| NewsletterIssue {
                    id: row.get("id"),
                    newsletter_id: row.get("newsletter_id"),
                    subject: row.get("subject"),
                    body: row.get("body"),
                    featured_article_ids: Vec::new(),
                    sent_at: row.get("sent_at"),
                    is_draft: row.get("is_draft"),
                    created_at: row.get("created_at"),
                })
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(bind)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to query newsletter issues")?
                .iter()
                .map(|row| NewsletterIssue {
                    id: row.get("id"),
                    newsletter_id: row.get("newsletter_id"),
                    subject: row.get("subject"),
                    body: row.get("body"),
                    featured_article_ids: Vec::new(),
                    sent_at: row.get("sent_at"),
                    is_draft: row.get("is_draft"),
                    created_at: row.get("created_at"),
                })
                .collect(),
        };
        for issue in issues.iter_mut() {
            issue.featured_article_ids = self.featured_ids(issue.id).await?;
        }
        Ok(issues)
    }
}

#[async_trait]
impl NewsletterRepository for SqlxNewsletterRepository {
    async fn create(&self, newsletter: &Newsletter) -> Result<Newsletter> {
        let now = Utc::now();
        let published_at = (newsletter.status == ContentStatus::Published).then_some(now);
        let sql = r#"
            INSERT INTO newsletters (title, description, subject, status, author_id, publisher_id,
                                     is_active, created_at, updated_at, published_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&newsletter.title)
                .bind(&newsletter.description)
                .bind(&newsletter.subject)
                .bind(newsletter.status.as_str())
                .bind(newsletter.author_id)
                .bind(newsletter.publisher_id)
                .bind(newsletter.is_active)
                .bind(now)
                .bind(now)
                .bind(published_at)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to create newsletter")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&newsletter.title)
                .bind(&newsletter.description)
                .bind(&newsletter.subject)
                .bind(newsletter.status.as_str())
                .bind(newsletter.author_id)
                .bind(newsletter.publisher_id)
                .bind(newsletter.is_active)
                .bind(now)
                .bind(now)
                .bind(published_at)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to create newsletter")?
                .last_insert_id() as i64,
        };
        Ok(Newsletter {
            id,
            created_at: now,
            updated_at: now,
            published_at,
            ..newsletter.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Newsletter>> {
        Ok(self.fetch_where("WHERE id = ?", &[id]).await?.into_iter().next())
    }

    async fn update(&self, newsletter: &Newsletter, status: Option<ContentStatus>) -> Result<(Newsletter, bool)> {
        let now = Utc::now();
        let changed = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = sqlite(&self.pool)?
                    .begin()
                    .await
                    .context("Failed to begin transaction")?;
                update_fields_sqlite(&mut tx, newsletter, now).await?;
                let changed = match status {
                    Some(status) => transition_sqlite(&mut tx, newsletter.id, status, now).await?,
                    None => false,
                };
                tx.commit().await.context("Failed to commit newsletter update")?;
                changed
            }
            DatabaseDriver::Mysql => {
                let mut tx = mysql(&self.pool)?
                    .begin()
                    .await
                    .context("Failed to begin transaction")?;
                update_fields_mysql(&mut tx, newsletter, now).await?;
                let changed = match status {
                    Some(status) => transition_mysql(&mut tx, newsletter.id, status, now).await?,
                    None => false,
                };
                tx.commit().await.context("Failed to commit newsletter update")?;
                changed
            }
        };
        let stored = self
            .get_by_id(newsletter.id)
            .await?
            .context("Newsletter missing after update")?;
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
        let sql = "DELETE FROM newsletters WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to delete newsletter")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to delete newsletter")?;
            }
        }
        Ok(())
    }

    async fn list_published(&self, params: &ListParams) -> Result<(Vec<Newsletter>, i64)> {
        let sql = format!(
            "SELECT {} FROM newsletters WHERE status = 'published' ORDER BY published_at DESC, id DESC LIMIT ? OFFSET ?",
            NEWSLETTER_COLUMNS
        );
        let count_sql = "SELECT COUNT(*) AS count FROM newsletters WHERE status = 'published'";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = sqlite(&self.pool)?;
                let rows = sqlx::query(&sql)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list newsletters")?;
                let total: i64 = sqlx::query(count_sql)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count newsletters")?
                    .get("count");
                let items = rows.iter().map(row_to_newsletter_sqlite).collect::<Result<_>>()?;
                Ok((items, total))
            }
            DatabaseDriver::Mysql => {
                let pool = mysql(&self.pool)?;
                let rows = sqlx::query(&sql)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list newsletters")?;
                let total: i64 = sqlx::query(count_sql)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count newsletters")?
                    .get("count");
                let items = rows.iter().map(row_to_newsletter_mysql).collect::<Result<_>>()?;
                Ok((items, total))
            }
        }
    }

    async fn list_by_author(&self, author_id: i64) -> Result<Vec<Newsletter>> {
        self.fetch_where("WHERE author_id = ? ORDER BY created_at DESC, id DESC", &[author_id])
            .await
    }

    async fn list_review_queue(&self, editor_id: i64) -> Result<Vec<Newsletter>> {
        let clause = "WHERE status = 'pending' AND publisher_id IN \
             (SELECT publisher_id FROM publisher_members WHERE user_id = ?) \
             ORDER BY created_at ASC, id ASC";
        self.fetch_where(clause, &[editor_id]).await
    }

    async fn list_pending(&self) -> Result<Vec<Newsletter>> {
        self.fetch_where("WHERE status = 'pending' ORDER BY created_at ASC, id ASC", &[])
            .await
    }

    async fn subscribe(&self, newsletter_id: i64, user_id: i64) -> Result<bool> {
        let sql = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                "INSERT OR IGNORE INTO newsletter_subscribers (newsletter_id, user_id, created_at) VALUES (?, ?, ?)"
            }
            DatabaseDriver::Mysql => {
                "INSERT IGNORE INTO newsletter_subscribers (newsletter_id, user_id, created_at) VALUES (?, ?, ?)"
            }
        };
        let inserted = self
            .insert_pair(sql, newsletter_id, user_id)
            .await
            .context("Failed to subscribe to newsletter")?;
        Ok(inserted == 1)
    }

    async fn unsubscribe(&self, newsletter_id: i64, user_id: i64) -> Result<bool> {
        let sql = "DELETE FROM newsletter_subscribers WHERE newsletter_id = ? AND user_id = ?";
        let removed = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(newsletter_id)
                .bind(user_id)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to unsubscribe from newsletter")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(newsletter_id)
                .bind(user_id)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to unsubscribe from newsletter")?
                .rows_affected(),
        };
        Ok(removed == 1)
    }

    async fn subscribers(&self, newsletter_id: i64) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM newsletter_subscribers s JOIN users u ON u.id = s.user_id \
             WHERE s.newsletter_id = ? ORDER BY u.id",
            JOINED_USER_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(newsletter_id)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to list newsletter subscribers")?
                .iter()
                .map(row_to_user_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(newsletter_id)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to list newsletter subscribers")?
                .iter()
                .map(row_to_user_mysql)
                .collect(),
        }
    }

    async fn create_issue(&self, newsletter_id: i64, input: &CreateIssueInput) -> Result<NewsletterIssue> {
        let now = Utc::now();
        let issue_sql = "INSERT INTO newsletter_issues (newsletter_id, subject, body, is_draft, created_at) \
                         VALUES (?, ?, ?, ?, ?)";
        let mut featured = input.featured_article_ids.clone();
        featured.sort_unstable();
        featured.dedup();

        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = sqlite(&self.pool)?.begin().await?;
                let id = sqlx::query(issue_sql)
                    .bind(newsletter_id)
                    .bind(&input.subject)
                    .bind(&input.body)
                    .bind(true)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to create newsletter issue")?
                    .last_insert_rowid();
                for article_id in &featured {
                    sqlx::query("INSERT INTO newsletter_issue_articles (issue_id, article_id) VALUES (?, ?)")
                        .bind(id)
                        .bind(*article_id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to attach featured article")?;
                }
                tx.commit().await?;
                id
            }
            DatabaseDriver::Mysql => {
                let mut tx = mysql(&self.pool)?.begin().await?;
                let id = sqlx::query(issue_sql)
                    .bind(newsletter_id)
                    .bind(&input.subject)
                    .bind(&input.body)
                    .bind(true)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to create newsletter issue")?
                    .last_insert_id() as i64;
                for article_id in &featured {
                    sqlx::query("INSERT INTO newsletter_issue_articles (issue_id, article_id) VALUES (?, ?)")
                        .bind(id)
                        .bind(*article_id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to attach featured article")?;
                }
                tx.commit().await?;
                id
            }
        };

        Ok(NewsletterIssue {
            id,
            newsletter_id,
            subject: input.subject.clone(),
            body: input.body.clone(),
            featured_article_ids: featured,
            sent_at: None,
            is_draft: true,
            created_at: now,
        })
    }

    async fn get_issue(&self, issue_id: i64) -> Result<Option<NewsletterIssue>> {
        Ok(self
            .fetch_issues("WHERE id = ?", issue_id)
            .await?
            .into_iter()
            .next())
    }

    async fn list_issues(&self, newsletter_id: i64) -> Result<Vec<NewsletterIssue>> {
        self.fetch_issues("WHERE newsletter_id = ? ORDER BY created_at DESC, id DESC", newsletter_id)
            .await
    }

    async fn mark_issue_sent(&self, issue_id: i64) -> Result<bool> {
        let sql = "UPDATE newsletter_issues SET is_draft = ?, sent_at = ? WHERE id = ? AND is_draft = ?";
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(false)
                .bind(now)
                .bind(issue_id)
                .bind(true)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to mark issue sent")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(false)
                .bind(now)
                .bind(issue_id)
                .bind(true)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to mark issue sent")?
                .rows_affected(),
        };
        Ok(affected == 1)
    }
}

async fn update_fields_sqlite(
    conn: &mut SqliteConnection,
    newsletter: &Newsletter,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(UPDATE_FIELDS_SQL)
        .bind(&newsletter.title)
        .bind(&newsletter.description)
        .bind(&newsletter.subject)
        .bind(newsletter.publisher_id)
        .bind(newsletter.is_active)
        .bind(now)
        .bind(newsletter.id)
        .execute(conn)
        .await
        .context("Failed to update newsletter")?;
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
        .context("Failed to change newsletter status")?
        .rows_affected();
    Ok(affected == 1)
}

async fn update_fields_mysql(
    conn: &mut MySqlConnection,
    newsletter: &Newsletter,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(UPDATE_FIELDS_SQL)
        .bind(&newsletter.title)
        .bind(&newsletter.description)
        .bind(&newsletter.subject)
        .bind(newsletter.publisher_id)
        .bind(newsletter.is_active)
        .bind(now)
        .bind(newsletter.id)
        .execute(conn)
        .await
        .context("Failed to update newsletter")?;
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
        .context("Failed to change newsletter status")?
        .rows_affected();
    Ok(affected == 1)
}

fn row_to_newsletter_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Newsletter> {
    let status: String = row.get("status");
    Ok(Newsletter {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        subject: row.get("subject"),
        status: ContentStatus::from_str(&status)
            .with_context(|| format!("Invalid status in database: {}", status))?,
        author_id: row.get("author_id"),
        publisher_id: row.get("publisher_id"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        published_at: row.get("published_at"),
    })
}

fn row_to_newsletter_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Newsletter> {
    let status: String = row.get("status");
    Ok(Newsletter {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        subject: row.get("subject"),
        status: ContentStatus::from_str(&status)
            .with_context(|| format!("Invalid status in database: {}", status))?,
        author_id: row.get("author_id"),
        publisher_id: row.get("publisher_id"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        published_at: row.get("published_at"),
    })
}

#[cfg(test)]
pub(crate) fn draft_newsletter(title: &str, author_id: i64, publisher_id: Option<i64>) -> Newsletter {
    let now = Utc::now();
    Newsletter {
        id: 0,
        title: title.to_string(),
        description: String::new(),
        subject: format!("{} subject", title),
        status: ContentStatus::Draft,
        author_id,
        publisher_id,
        is_active: true,
        created_at: now,
        updated_at: now,
        published_at: None,
    }
}
