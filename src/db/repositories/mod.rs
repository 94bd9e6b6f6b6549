//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one aggregate and hides the
//! SQLite/MySQL split behind an async trait.

pub mod article;
pub mod comment;
pub mod invitation;
pub mod join_request;
pub mod newsletter;
pub mod publisher;
pub mod session;
pub mod subscription;
pub mod user;

pub use article::{ArticleRepository, SqlxArticleRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use invitation::{InvitationRepository, SqlxInvitationRepository};
pub use join_request::{JoinRequestRepository, SqlxJoinRequestRepository};
pub use newsletter::{NewsletterRepository, SqlxNewsletterRepository};
pub use publisher::{PublisherRepository, SqlxPublisherRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use subscription::{SqlxSubscriptionRepository, SubscriptionRepository};
pub use user::{SqlxUserRepository, UserRepository};

#[cfg(test)]
pub(crate) mod test_support {
    use super::{PublisherRepository, SqlxPublisherRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{CreatePublisherInput, Publisher, User, UserRole};

    /// Migrated in-memory database
    pub async fn setup_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    pub async fn seed_user(
        pool: &DynDatabasePool,
        username: &str,
        email: Option<&str>,
        role: UserRole,
    ) -> User {
        let user = User::new(
            username.to_string(),
            email.map(str::to_string),
            "$argon2id$placeholder".to_string(),
            role,
        );
        SqlxUserRepository::new(pool.clone())
            .create(&user)
            .await
            .expect("Failed to seed user")
    }

    /// Publisher owned (and joined) by `owner_id`
    pub async fn seed_publisher(pool: &DynDatabasePool, name: &str, owner_id: i64) -> Publisher {
        let input = CreatePublisherInput {
            name: name.to_string(),
            description: format!("{} desk", name),
        };
        SqlxPublisherRepository::new(pool.clone())
            .create_with_owner(&input, owner_id)
            .await
            .expect("Failed to seed publisher")
    }
}
