//! Comment repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{Comment, CommentThread, CreateCommentInput};

const COMMENT_COLUMNS: &str = "id, article_id, author_id, parent_id, content, created_at";

const BY_ARTICLE_SQL: &str = r#"
    SELECT c.id, c.article_id, c.author_id, u.username AS author_name, c.parent_id, c.content, c.created_at
    FROM comments c
    JOIN users u ON u.id = c.author_id
    WHERE c.article_id = ?
    ORDER BY c.created_at ASC, c.id ASC
"#;

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, article_id: i64, author_id: i64, input: &CreateCommentInput) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Flat list of an article's comments with author names, oldest first
    async fn list_by_article(&self, article_id: i64) -> Result<Vec<CommentThread>>;

    /// Delete a comment and, through the foreign key, its replies
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// Comment repository implementation
pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, article_id: i64, author_id: i64, input: &CreateCommentInput) -> Result<Comment> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_sqlite(sqlite(&self.pool)?, article_id, author_id, input).await,
            DatabaseDriver::Mysql => create_mysql(mysql(&self.pool)?, article_id, author_id, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = format!("SELECT {} FROM comments WHERE id = ?", COMMENT_COLUMNS);
        let comment = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(sqlite(&self.pool)?)
                .await
                .context("Failed to get comment")?
                .map(|row| Comment {
                    id: row.get("id"),
                    article_id: row.get("article_id"),
                    author_id: row.get("author_id"),
                    parent_id: row.get("parent_id"),
                    content: row.get("content"),
                    created_at: row.get("created_at"),
                }),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(mysql(&self.pool)?)
                .await
                .context("Failed to get comment")?
                .map(|row| Comment {
                    id: row.get("id"),
                    article_id: row.get("article_id"),
                    author_id: row.get("author_id"),
                    parent_id: row.get("parent_id"),
                    content: row.get("content"),
                    created_at: row.get("created_at"),
                }),
        };
        Ok(comment)
    }

    async fn list_by_article(&self, article_id: i64) -> Result<Vec<CommentThread>> {
        let comments = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(BY_ARTICLE_SQL)
                .bind(article_id)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to list comments")?
                .iter()
                .map(|row| CommentThread {
                    id: row.get("id"),
                    article_id: row.get("article_id"),
                    author_id: row.get("author_id"),
                    author_name: row.get("author_name"),
                    parent_id: row.get("parent_id"),
                    content: row.get("content"),
                    created_at: row.get("created_at"),
                    replies: Vec::new(),
                })
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(BY_ARTICLE_SQL)
                .bind(article_id)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to list comments")?
                .iter()
                .map(|row| CommentThread {
                    id: row.get("id"),
                    article_id: row.get("article_id"),
                    author_id: row.get("author_id"),
                    author_name: row.get("author_name"),
                    parent_id: row.get("parent_id"),
                    content: row.get("content"),
                    created_at: row.get("created_at"),
                    replies: Vec::new(),
                })
                .collect(),
        };
        Ok(comments)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM comments WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to delete comment")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to delete comment")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_sqlite(
    pool: &SqlitePool,
    article_id: i64,
    author_id: i64,
    input: &CreateCommentInput,
) -> Result<Comment> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO comments (article_id, author_id, parent_id, content, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(article_id)
    .bind(author_id)
    .bind(input.parent_id)
    .bind(&input.content)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create comment")?;

    Ok(Comment {
        id: result.last_insert_rowid(),
        article_id,
        author_id,
        parent_id: input.parent_id,
        content: input.content.clone(),
        created_at: now,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_mysql(
    pool: &MySqlPool,
    article_id: i64,
    author_id: i64,
    input: &CreateCommentInput,
) -> Result<Comment> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO comments (article_id, author_id, parent_id, content, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(article_id)
    .bind(author_id)
    .bind(input.parent_id)
    .bind(&input.content)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create comment")?;

    Ok(Comment {
        id: result.last_insert_id() as i64,
        article_id,
        author_id,
        parent_id: input.parent_id,
        content: input.content.clone(),
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::article::draft;
    use crate::db::repositories::test_support::{seed_user, setup_pool};
    use crate::db::repositories::{ArticleRepository, SqlxArticleRepository};
    use crate::models::UserRole;

    fn input(content: &str, parent_id: Option<i64>) -> CreateCommentInput {
        CreateCommentInput {
            parent_id,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_list_with_author_names() {
        let pool = setup_pool().await;
        let alice = seed_user(&pool, "alice", None, UserRole::Journalist).await;
        let carol = seed_user(&pool, "carol", None, UserRole::Reader).await;
        let article = SqlxArticleRepository::new(pool.clone())
            .create(&draft("Test", alice.id, None))
            .await
            .unwrap();
        let repo = SqlxCommentRepository::new(pool);

        let top = repo.create(article.id, carol.id, &input("Nice", None)).await.unwrap();
        let reply = repo
            .create(article.id, alice.id, &input("Thanks", Some(top.id)))
            .await
            .unwrap();
        assert_eq!(reply.parent_id, Some(top.id));

        let listed = repo.list_by_article(article.id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].author_name, "carol");
        assert_eq!(listed[1].author_name, "alice");

        let fetched = repo.get_by_id(top.id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "Nice");
    }

    #[tokio::test]
    async fn test_delete_cascades_to_replies() {
        let pool = setup_pool().await;
        let alice = seed_user(&pool, "alice", None, UserRole::Journalist).await;
        let article = SqlxArticleRepository::new(pool.clone())
            .create(&draft("Test", alice.id, None))
            .await
            .unwrap();
        let repo = SqlxCommentRepository::new(pool);

        let top = repo.create(article.id, alice.id, &input("Top", None)).await.unwrap();
        let reply = repo
            .create(article.id, alice.id, &input("Reply", Some(top.id)))
            .await
            .unwrap();

        assert!(repo.delete(top.id).await.unwrap());
        assert!(!repo.delete(top.id).await.unwrap());
        assert!(repo.get_by_id(reply.id).await.unwrap().is_none());
    }
}
