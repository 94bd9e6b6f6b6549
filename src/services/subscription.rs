//! Reader subscriptions and the subscribed-articles feed

use crate::db::repositories::{PublisherRepository, SubscriptionRepository, UserRepository};
use crate::models::{FeedArticle, User, UserRole};
use crate::services::authorization::{require, Action};
use crate::services::error::{ServiceError, ServiceResult};
use serde::Serialize;
use std::sync::Arc;

/// Everything a user follows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Subscriptions {
    pub publishers: Vec<i64>,
    pub journalists: Vec<i64>,
}

pub struct SubscriptionService {
    repo: Arc<dyn SubscriptionRepository>,
    publishers: Arc<dyn PublisherRepository>,
    users: Arc<dyn UserRepository>,
}

impl SubscriptionService {
    pub fn new(
        repo: Arc<dyn SubscriptionRepository>,
        publishers: Arc<dyn PublisherRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            repo,
            publishers,
            users,
        }
    }

    /// Returns false when the user already followed the publisher
    pub async fn subscribe_publisher(&self, user: &User, publisher_id: i64) -> ServiceResult<bool> {
        require(user, Action::Subscribe)?;
        if self.publishers.get_by_id(publisher_id).await?.is_none() {
            return Err(ServiceError::not_found("Publisher", publisher_id));
        }
        let created = self.repo.subscribe_publisher(user.id, publisher_id).await?;
        tracing::info!(user_id = user.id, publisher_id, created, "Subscribed to publisher");
        Ok(created)
    }

    pub async fn unsubscribe_publisher(&self, user: &User, publisher_id: i64) -> ServiceResult<bool> {
        require(user, Action::Subscribe)?;
        Ok(self.repo.unsubscribe_publisher(user.id, publisher_id).await?)
    }

    /// Follow a journalist. The target has to currently hold the journalist role.
    pub async fn subscribe_journalist(&self, user: &User, journalist_id: i64) -> ServiceResult<bool> {
        require(user, Action::Subscribe)?;
        let target = self
            .users
            .get_by_id(journalist_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", journalist_id))?;
        if target.role != UserRole::Journalist {
            return Err(ServiceError::invalid(
                "journalist",
                format!("{} is not a journalist.", target.username),
            ));
        }
        let created = self.repo.subscribe_journalist(user.id, journalist_id).await?;
        tracing::info!(user_id = user.id, journalist_id, created, "Subscribed to journalist");
        Ok(created)
    }

    pub async fn unsubscribe_journalist(&self, user: &User, journalist_id: i64) -> ServiceResult<bool> {
        require(user, Action::Subscribe)?;
        Ok(self.repo.unsubscribe_journalist(user.id, journalist_id).await?)
    }

    pub async fn list(&self, user: &User) -> ServiceResult<Subscriptions> {
        Ok(Subscriptions {
            publishers: self.repo.subscribed_publishers(user.id).await?,
            journalists: self.repo.subscribed_journalists(user.id).await?,
        })
    }

    /// Published articles from everything `user_id` follows, newest first
    pub async fn feed(&self, user_id: i64) -> ServiceResult<Vec<FeedArticle>> {
        if self.users.get_by_id(user_id).await?.is_none() {
            return Err(ServiceError::not_found("User", user_id));
        }
        Ok(self.repo.feed_for(user_id).await?)
    }
}
