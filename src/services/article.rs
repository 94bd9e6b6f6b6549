//! Article service
//!
//! Creation, editing and review of articles. Every entry point checks the
//! acting user's capabilities first; the publish edge hands the article to
//! the notification fan-out after the status change is committed.

use crate::db::repositories::{ArticleRepository, PublisherRepository};
use crate::models::{
    Article, ContentKind, ContentStatus, CreateArticleInput, ListParams, PagedResult,
    UpdateArticleInput, User,
};
use crate::services::authorization::{require, require_reviewer, Action};
use crate::services::content::{
    can_view, form_for, require_editor_of, require_owner, resolve_publisher, WorkflowOutcome,
};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::forms::ContentSubmission;
use crate::services::notification::{FanOutReport, NotificationService, Publication};
use chrono::Utc;
use std::sync::Arc;

/// Outcome of a review decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

pub struct ArticleService {
    repo: Arc<dyn ArticleRepository>,
    publishers: Arc<dyn PublisherRepository>,
    notifications: Arc<NotificationService>,
}

impl ArticleService {
    pub fn new(
        repo: Arc<dyn ArticleRepository>,
        publishers: Arc<dyn PublisherRepository>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            repo,
            publishers,
            notifications,
        }
    }

    /// Create an article authored by `user`.
    ///
    /// `context_publisher` is the publisher picked outside the form (query
    /// parameter); it is honored for every role.
    pub async fn create(
        &self,
        user: &User,
        input: CreateArticleInput,
        context_publisher: Option<i64>,
    ) -> ServiceResult<WorkflowOutcome<Article>> {
        require(user, Action::CreateContent)?;

        let form = form_for(self.publishers.as_ref(), user, ContentKind::Article).await?;
        form.validate(
            &ContentSubmission {
                title: Some(input.title.clone()),
                status: input.status,
                publisher: input.publisher_id,
            },
            true,
        )?;
        if input.content.trim().is_empty() {
            return Err(ServiceError::invalid("content", "This field is required."));
        }

        let publisher_id = resolve_publisher(
            self.publishers.as_ref(),
            user,
            input.publisher_id.or(context_publisher),
        )
        .await?;
        let status = input.status.unwrap_or_default();
        if status.requires_review() {
            require_reviewer(self.publishers.as_ref(), user, publisher_id).await?;
        }

        let now = Utc::now();
        let article = self
            .repo
            .create(&Article {
                id: 0,
                title: input.title.trim().to_string(),
                content: input.content,
                status,
                author_id: user.id,
                publisher_id,
                created_at: now,
                updated_at: now,
                published_at: None,
            })
            .await?;
        tracing::info!(
            article_id = article.id,
            author_id = user.id,
            publisher_id = ?article.publisher_id,
            status = %article.status,
            "Article created"
        );

        let notifications = if article.is_published() {
            Some(self.fan_out(&article).await)
        } else {
            None
        };
        Ok(WorkflowOutcome {
            content: article,
            notifications,
        })
    }

    /// Article by id as seen by `viewer`. Unpublished articles the viewer may
    /// not see are reported as missing.
    pub async fn get(&self, id: i64, viewer: Option<&User>) -> ServiceResult<Article> {
        let article = self.load(id).await?;
        let visible = can_view(
            self.publishers.as_ref(),
            viewer,
            article.status,
            article.author_id,
            article.publisher_id,
        )
        .await?;
        if visible {
            Ok(article)
        } else {
            Err(ServiceError::not_found("Article", id))
        }
    }

    pub async fn update(
        &self,
        user: &User,
        id: i64,
        input: UpdateArticleInput,
    ) -> ServiceResult<WorkflowOutcome<Article>> {
        let mut article = self.load(id).await?;
        require_editor_of(self.publishers.as_ref(), user, article.author_id, article.publisher_id)
            .await?;

        let form = form_for(self.publishers.as_ref(), user, ContentKind::Article).await?;
        form.validate(
            &ContentSubmission {
                title: input.title.clone(),
                status: input.status,
                publisher: input.publisher_id,
            },
            false,
        )?;

        if let Some(title) = input.title {
            article.title = title.trim().to_string();
        }
        if let Some(content) = input.content {
            if content.trim().is_empty() {
                return Err(ServiceError::invalid("content", "This field may not be blank."));
            }
            article.content = content;
        }
        if let Some(publisher_id) = input.publisher_id {
            article.publisher_id =
                resolve_publisher(self.publishers.as_ref(), user, Some(publisher_id)).await?;
        }

        let target = input.status.filter(|s| *s != article.status);
        if let Some(status) = target {
            if status.requires_review() {
                require_reviewer(self.publishers.as_ref(), user, article.publisher_id).await?;
            }
            if article.status == ContentStatus::Published && status == ContentStatus::Rejected {
                return Err(ServiceError::conflict("Published content cannot be rejected"));
            }
        }

        let (article, changed) = self.repo.update(&article, target).await?;
        let notifications = if changed && target == Some(ContentStatus::Published) {
            Some(self.fan_out(&article).await)
        } else {
            None
        };
        tracing::info!(article_id = id, user_id = user.id, "Article updated");

        Ok(WorkflowOutcome {
            content: article,
            notifications,
        })
    }

    pub async fn delete(&self, user: &User, id: i64) -> ServiceResult<()> {
        let article = self.load(id).await?;
        require_owner(user, article.author_id)?;
        self.repo.delete(id).await?;
        tracing::info!(article_id = id, user_id = user.id, "Article deleted");
        Ok(())
    }

    pub async fn list_published(&self, params: &ListParams) -> ServiceResult<PagedResult<Article>> {
        let (items, total) = self.repo.list_published(params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Everything `user` has written, any status
    pub async fn mine(&self, user: &User) -> ServiceResult<Vec<Article>> {
        Ok(self.repo.list_by_author(user.id).await?)
    }

    /// Pending articles of the reviewer's publishers, oldest first.
    /// Admins see every pending article, independent ones included.
    pub async fn review_queue(&self, user: &User) -> ServiceResult<Vec<Article>> {
        require(user, Action::ReviewContent)?;
        if user.is_admin() {
            return Ok(self.repo.list_pending().await?);
        }
        Ok(self.repo.list_review_queue(user.id).await?)
    }

    /// Approve or reject an article.
    ///
    /// Approval notifies subscribers only when it actually moves the article
    /// into `Published`; approving a published article changes nothing.
    pub async fn review(
        &self,
        user: &User,
        id: i64,
        decision: Decision,
    ) -> ServiceResult<WorkflowOutcome<Article>> {
        let article = self.load(id).await?;
        require_reviewer(self.publishers.as_ref(), user, article.publisher_id).await?;

        let status = match decision {
            Decision::Approve => ContentStatus::Published,
            Decision::Reject if article.is_published() => {
                return Err(ServiceError::conflict("Published content cannot be rejected"));
            }
            Decision::Reject => ContentStatus::Rejected,
        };

        let changed = self.repo.transition(id, status).await?;
        let article = self.load(id).await?;
        tracing::info!(
            article_id = id,
            reviewer_id = user.id,
            status = %status,
            changed,
            "Article reviewed"
        );

        let notifications = if changed && status == ContentStatus::Published {
            Some(self.fan_out(&article).await)
        } else {
            None
        };
        Ok(WorkflowOutcome {
            content: article,
            notifications,
        })
    }

    async fn load(&self, id: i64) -> ServiceResult<Article> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Article", id))
    }

    async fn fan_out(&self, article: &Article) -> FanOutReport {
        self.notifications
            .content_published(&Publication::from(article))
            .await
    }
}
