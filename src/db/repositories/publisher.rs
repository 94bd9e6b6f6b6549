//! Publisher repository
//!
//! Publishers and their membership relation. Membership rows are unique per
//! (user, publisher) and always inserted with insert-or-ignore, so concurrent
//! invitation acceptance or join approval can never add a member twice.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{CreatePublisherInput, Membership, Publisher, PublisherMember, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const PUBLISHER_COLUMNS: &str = "id, name, description, owner_id, created_at, updated_at";

pub(crate) const INSERT_MEMBER_SQLITE: &str =
    "INSERT OR IGNORE INTO publisher_members (user_id, publisher_id, joined_at) VALUES (?, ?, ?)";
pub(crate) const INSERT_MEMBER_MYSQL: &str =
    "INSERT IGNORE INTO publisher_members (user_id, publisher_id, joined_at) VALUES (?, ?, ?)";

const MEMBERS_SQL: &str = r#"
    SELECT u.id AS user_id, u.username, u.role, m.joined_at
    FROM publisher_members m
    JOIN users u ON u.id = m.user_id
    WHERE m.publisher_id = ?
    ORDER BY m.joined_at ASC, u.id ASC
"#;

const MEMBERSHIPS_SQL: &str = r#"
    SELECT user_id, publisher_id, joined_at
    FROM publisher_members
    WHERE user_id = ?
    ORDER BY joined_at ASC, publisher_id ASC
"#;

#[async_trait]
pub trait PublisherRepository: Send + Sync {
    /// Create a publisher and enroll its owner as the first member, atomically
    async fn create_with_owner(&self, input: &CreatePublisherInput, owner_id: i64)
        -> Result<Publisher>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Publisher>>;

    async fn get_by_owner(&self, owner_id: i64) -> Result<Option<Publisher>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Publisher>>;

    async fn list(&self) -> Result<Vec<Publisher>>;

    async fn is_member(&self, user_id: i64, publisher_id: i64) -> Result<bool>;

    /// Memberships of a user, oldest first
    async fn memberships_of(&self, user_id: i64) -> Result<Vec<Membership>>;

    async fn members(&self, publisher_id: i64) -> Result<Vec<PublisherMember>>;

    /// Add a member; returns false when the user already was one
    async fn add_member(&self, user_id: i64, publisher_id: i64) -> Result<bool>;
}

pub struct SqlxPublisherRepository {
    pool: DynDatabasePool,
}

impl SqlxPublisherRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PublisherRepository> {
        Arc::new(Self::new(pool))
    }

    async fn find_one(&self, filter: &str, bind: FindBy<'_>) -> Result<Option<Publisher>> {
        let sql = format!("SELECT {} FROM publishers WHERE {} = ?", PUBLISHER_COLUMNS, filter);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let query = sqlx::query(&sql);
                let query = match bind {
                    FindBy::Id(v) => query.bind(v),
                    FindBy::Name(v) => query.bind(v.to_string()),
                };
                let row = query
                    .fetch_optional(sqlite(&self.pool)?)
                    .await
                    .context("Failed to get publisher")?;
                Ok(row.as_ref().map(row_to_publisher_sqlite))
            }
            DatabaseDriver::Mysql => {
                let query = sqlx::query(&sql);
                let query = match bind {
                    FindBy::Id(v) => query.bind(v),
                    FindBy::Name(v) => query.bind(v.to_string()),
                };
                let row = query
                    .fetch_optional(mysql(&self.pool)?)
                    .await
                    .context("Failed to get publisher")?;
                Ok(row.as_ref().map(row_to_publisher_mysql))
            }
        }
    }
}

enum FindBy<'a> {
    Id(i64),
    Name(&'a str),
}

#[async_trait]
impl PublisherRepository for SqlxPublisherRepository {
    async fn create_with_owner(
        &self,
        input: &CreatePublisherInput,
        owner_id: i64,
    ) -> Result<Publisher> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_publisher_sqlite(sqlite(&self.pool)?, input, owner_id).await
            }
            DatabaseDriver::Mysql => create_publisher_mysql(mysql(&self.pool)?, input, owner_id).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Publisher>> {
        self.find_one("id", FindBy::Id(id)).await
    }

    async fn get_by_owner(&self, owner_id: i64) -> Result<Option<Publisher>> {
        self.find_one("owner_id", FindBy::Id(owner_id)).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Publisher>> {
        self.find_one("name", FindBy::Name(name)).await
    }

    async fn list(&self) -> Result<Vec<Publisher>> {
        let sql = format!("SELECT {} FROM publishers ORDER BY name ASC", PUBLISHER_COLUMNS);
        let publishers = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to list publishers")?
                .iter()
                .map(row_to_publisher_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to list publishers")?
                .iter()
                .map(row_to_publisher_mysql)
                .collect(),
        };
        Ok(publishers)
    }

    async fn is_member(&self, user_id: i64, publisher_id: i64) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM publisher_members WHERE user_id = ? AND publisher_id = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(user_id)
                .bind(publisher_id)
                .fetch_one(sqlite(&self.pool)?)
                .await
                .context("Failed to check membership")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(user_id)
                .bind(publisher_id)
                .fetch_one(mysql(&self.pool)?)
                .await
                .context("Failed to check membership")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn memberships_of(&self, user_id: i64) -> Result<Vec<Membership>> {
        let memberships = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(MEMBERSHIPS_SQL)
                .bind(user_id)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to list memberships")?
                .iter()
                .map(|row| Membership {
                    user_id: row.get("user_id"),
                    publisher_id: row.get("publisher_id"),
                    joined_at: row.get("joined_at"),
                })
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(MEMBERSHIPS_SQL)
                .bind(user_id)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to list memberships")?
                .iter()
                .map(|row| Membership {
                    user_id: row.get("user_id"),
                    publisher_id: row.get("publisher_id"),
                    joined_at: row.get("joined_at"),
                })
                .collect(),
        };
        Ok(memberships)
    }

    async fn members(&self, publisher_id: i64) -> Result<Vec<PublisherMember>> {
        let rows: Vec<(i64, String, String, chrono::DateTime<Utc>)> = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(MEMBERS_SQL)
                .bind(publisher_id)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to list members")?
                .iter()
                .map(|row| {
                    (
                        row.get("user_id"),
                        row.get("username"),
                        row.get("role"),
                        row.get("joined_at"),
                    )
                })
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(MEMBERS_SQL)
                .bind(publisher_id)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to list members")?
                .iter()
                .map(|row| {
                    (
                        row.get("user_id"),
                        row.get("username"),
                        row.get("role"),
                        row.get("joined_at"),
                    )
                })
                .collect(),
        };

        rows.into_iter()
            .map(|(user_id, username, role, joined_at)| {
                Ok(PublisherMember {
                    user_id,
                    username,
                    role: UserRole::from_str(&role)
                        .with_context(|| format!("Invalid role in database: {}", role))?,
                    joined_at,
                })
            })
            .collect()
    }

    async fn add_member(&self, user_id: i64, publisher_id: i64) -> Result<bool> {
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_MEMBER_SQLITE)
                .bind(user_id)
                .bind(publisher_id)
                .bind(now)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to add member")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_MEMBER_MYSQL)
                .bind(user_id)
                .bind(publisher_id)
                .bind(now)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to add member")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_publisher_sqlite(
    pool: &SqlitePool,
    input: &CreatePublisherInput,
    owner_id: i64,
) -> Result<Publisher> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = sqlx::query(
        "INSERT INTO publishers (name, description, owner_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&input.name)
    .bind(&input.description)
    .bind(owner_id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create publisher")?
    .last_insert_rowid();

    sqlx::query(INSERT_MEMBER_SQLITE)
        .bind(owner_id)
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to enroll publisher owner")?;

    tx.commit().await.context("Failed to commit publisher")?;

    Ok(Publisher {
        id,
        name: input.name.clone(),
        description: input.description.clone(),
        owner_id,
        created_at: now,
        updated_at: now,
    })
}

fn row_to_publisher_sqlite(row: &sqlx::sqlite::SqliteRow) -> Publisher {
    Publisher {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        owner_id: row.get("owner_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_publisher_mysql(
    pool: &MySqlPool,
    input: &CreatePublisherInput,
    owner_id: i64,
) -> Result<Publisher> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = sqlx::query(
        "INSERT INTO publishers (name, description, owner_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&input.name)
    .bind(&input.description)
    .bind(owner_id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create publisher")?
    .last_insert_id() as i64;

    sqlx::query(INSERT_MEMBER_MYSQL)
        .bind(owner_id)
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to enroll publisher owner")?;

    tx.commit().await.context("Failed to commit publisher")?;

    Ok(Publisher {
        id,
        name: input.name.clone(),
        description: input.description.clone(),
        owner_id,
        created_at: now,
        updated_at: now,
    })
}

fn row_to_publisher_mysql(row: &sqlx::mysql::MySqlRow) -> Publisher {
    Publisher {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        owner_id: row.get("owner_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{seed_user, setup_pool};

    fn daily() -> CreatePublisherInput {
        CreatePublisherInput {
            name: "Daily".to_string(),
            description: "Morning news".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_enrolls_owner() {
        let pool = setup_pool().await;
        let bob = seed_user(&pool, "bob", None, UserRole::Editor).await;
        let repo = SqlxPublisherRepository::new(pool);

        let publisher = repo
            .create_with_owner(&daily(), bob.id)
            .await
            .expect("Failed to create publisher");

        assert!(publisher.id > 0);
        assert_eq!(publisher.owner_id, bob.id);
        assert!(repo.is_member(bob.id, publisher.id).await.unwrap());

        let members = repo.members(publisher.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].username, "bob");
        assert_eq!(members[0].role, UserRole::Editor);
    }

    #[tokio::test]
    async fn test_owner_can_hold_only_one_publisher() {
        let pool = setup_pool().await;
        let bob = seed_user(&pool, "bob", None, UserRole::Editor).await;
        let repo = SqlxPublisherRepository::new(pool);

        repo.create_with_owner(&daily(), bob.id).await.unwrap();
        let second = CreatePublisherInput {
            name: "Evening".to_string(),
            description: String::new(),
        };
        assert!(repo.create_with_owner(&second, bob.id).await.is_err());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_member_is_idempotent() {
        let pool = setup_pool().await;
        let bob = seed_user(&pool, "bob", None, UserRole::Editor).await;
        let alice = seed_user(&pool, "alice", None, UserRole::Journalist).await;
        let repo = SqlxPublisherRepository::new(pool);
        let publisher = repo.create_with_owner(&daily(), bob.id).await.unwrap();

        assert!(repo.add_member(alice.id, publisher.id).await.unwrap());
        assert!(!repo.add_member(alice.id, publisher.id).await.unwrap());
        assert_eq!(repo.members(publisher.id).await.unwrap().len(), 2);

        let memberships = repo.memberships_of(alice.id).await.unwrap();
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].publisher_id, publisher.id);
    }

    #[tokio::test]
    async fn test_lookup_by_owner_and_name() {
        let pool = setup_pool().await;
        let bob = seed_user(&pool, "bob", None, UserRole::Editor).await;
        let repo = SqlxPublisherRepository::new(pool);
        let publisher = repo.create_with_owner(&daily(), bob.id).await.unwrap();

        assert_eq!(repo.get_by_owner(bob.id).await.unwrap().map(|p| p.id), Some(publisher.id));
        assert!(repo.get_by_name("Daily").await.unwrap().is_some());
        assert!(repo.get_by_name("Weekly").await.unwrap().is_none());
        assert!(repo.get_by_id(publisher.id + 1).await.unwrap().is_none());
    }
}
