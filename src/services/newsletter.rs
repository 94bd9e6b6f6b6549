//! Newsletter service
//!
//! Same workflow as articles, plus direct subscriptions and issues. An issue
//! is dispatched once: the draft flag is cleared before delivery starts.

use crate::db::repositories::{ArticleRepository, NewsletterRepository, PublisherRepository};
use crate::models::{
    ContentKind, ContentStatus, CreateIssueInput, CreateNewsletterInput, ListParams, Newsletter,
    NewsletterIssue, PagedResult, UpdateNewsletterInput, User,
};
use crate::services::article::Decision;
use crate::services::authorization::{require, require_reviewer, Action};
use crate::services::content::{
    can_view, form_for, require_editor_of, require_owner, resolve_publisher, WorkflowOutcome,
};
use crate::services::error::{FieldErrors, ServiceError, ServiceResult};
use crate::services::forms::ContentSubmission;
use crate::services::notification::{FanOutReport, NotificationService, Publication};
use chrono::Utc;
use std::sync::Arc;

pub struct NewsletterService {
    repo: Arc<dyn NewsletterRepository>,
    articles: Arc<dyn ArticleRepository>,
    publishers: Arc<dyn PublisherRepository>,
    notifications: Arc<NotificationService>,
}

impl NewsletterService {
    pub fn new(
        repo: Arc<dyn NewsletterRepository>,
        articles: Arc<dyn ArticleRepository>,
        publishers: Arc<dyn PublisherRepository>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            repo,
            articles,
            publishers,
            notifications,
        }
    }

    pub async fn create(
        &self,
        user: &User,
        input: CreateNewsletterInput,
        context_publisher: Option<i64>,
    ) -> ServiceResult<WorkflowOutcome<Newsletter>> {
        require(user, Action::CreateContent)?;

        let form = form_for(self.publishers.as_ref(), user, ContentKind::Newsletter).await?;
        form.validate(
            &ContentSubmission {
                title: Some(input.title.clone()),
                status: input.status,
                publisher: input.publisher_id,
            },
            true,
        )?;
        let mut errors = FieldErrors::new();
        if input.description.trim().is_empty() {
            errors.add("description", "This field is required.");
        }
        if input.subject.trim().is_empty() {
            errors.add("subject", "This field is required.");
        }
        errors.into_result()?;

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
        let newsletter = self
            .repo
            .create(&Newsletter {
                id: 0,
                title: input.title.trim().to_string(),
                description: input.description,
                subject: input.subject.trim().to_string(),
                status,
                author_id: user.id,
                publisher_id,
                is_active: true,
                created_at: now,
                updated_at: now,
                published_at: None,
            })
            .await?;
        tracing::info!(
            newsletter_id = newsletter.id,
            author_id = user.id,
            publisher_id = ?newsletter.publisher_id,
            status = %newsletter.status,
            "Newsletter created"
        );

        let notifications = if newsletter.is_published() {
            Some(self.fan_out(&newsletter).await)
        } else {
            None
        };
        Ok(WorkflowOutcome {
            content: newsletter,
            notifications,
        })
    }

    pub async fn get(&self, id: i64, viewer: Option<&User>) -> ServiceResult<Newsletter> {
        let newsletter = self.load(id).await?;
        let visible = can_view(
            self.publishers.as_ref(),
            viewer,
            newsletter.status,
            newsletter.author_id,
            newsletter.publisher_id,
        )
        .await?;
        if visible {
            Ok(newsletter)
        } else {
            Err(ServiceError::not_found("Newsletter", id))
        }
    }

    pub async fn update(
        &self,
        user: &User,
        id: i64,
        input: UpdateNewsletterInput,
    ) -> ServiceResult<WorkflowOutcome<Newsletter>> {
        let mut newsletter = self.load(id).await?;
        require_editor_of(
            self.publishers.as_ref(),
            user,
            newsletter.author_id,
            newsletter.publisher_id,
        )
        .await?;

        let form = form_for(self.publishers.as_ref(), user, ContentKind::Newsletter).await?;
        form.validate(
            &ContentSubmission {
                title: input.title.clone(),
                status: input.status,
                publisher: input.publisher_id,
            },
            false,
        )?;

        let mut errors = FieldErrors::new();
        if let Some(title) = input.title {
            newsletter.title = title.trim().to_string();
        }
        if let Some(description) = input.description {
            if description.trim().is_empty() {
                errors.add("description", "This field may not be blank.");
            }
            newsletter.description = description;
        }
        if let Some(subject) = input.subject {
            if subject.trim().is_empty() {
                errors.add("subject", "This field may not be blank.");
            }
            newsletter.subject = subject.trim().to_string();
        }
        errors.into_result()?;
        if let Some(active) = input.is_active {
            newsletter.is_active = active;
        }
        if let Some(publisher_id) = input.publisher_id {
            newsletter.publisher_id =
                resolve_publisher(self.publishers.as_ref(), user, Some(publisher_id)).await?;
        }

        let target = input.status.filter(|s| *s != newsletter.status);
        if let Some(status) = target {
            if status.requires_review() {
                require_reviewer(self.publishers.as_ref(), user, newsletter.publisher_id).await?;
            }
            if newsletter.is_published() && status == ContentStatus::Rejected {
                return Err(ServiceError::conflict("Published content cannot be rejected"));
            }
        }

        let (newsletter, changed) = self.repo.update(&newsletter, target).await?;
        let notifications = if changed && target == Some(ContentStatus::Published) {
            Some(self.fan_out(&newsletter).await)
        } else {
            None
        };
        tracing::info!(newsletter_id = id, user_id = user.id, "Newsletter updated");

        Ok(WorkflowOutcome {
            content: newsletter,
            notifications,
        })
    }

    pub async fn delete(&self, user: &User, id: i64) -> ServiceResult<()> {
        let newsletter = self.load(id).await?;
        require_owner(user, newsletter.author_id)?;
        self.repo.delete(id).await?;
        tracing::info!(newsletter_id = id, user_id = user.id, "Newsletter deleted");
        Ok(())
    }

    pub async fn list_published(&self, params: &ListParams) -> ServiceResult<PagedResult<Newsletter>> {
        let (items, total) = self.repo.list_published(params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn mine(&self, user: &User) -> ServiceResult<Vec<Newsletter>> {
        Ok(self.repo.list_by_author(user.id).await?)
    }

    pub async fn review_queue(&self, user: &User) -> ServiceResult<Vec<Newsletter>> {
        require(user, Action::ReviewContent)?;
        if user.is_admin() {
            return Ok(self.repo.list_pending().await?);
        }
        Ok(self.repo.list_review_queue(user.id).await?)
    }

    pub async fn review(
        &self,
        user: &User,
        id: i64,
        decision: Decision,
    ) -> ServiceResult<WorkflowOutcome<Newsletter>> {
        let newsletter = self.load(id).await?;
        require_reviewer(self.publishers.as_ref(), user, newsletter.publisher_id).await?;

        let status = match decision {
            Decision::Approve => ContentStatus::Published,
            Decision::Reject if newsletter.is_published() => {
                return Err(ServiceError::conflict("Published content cannot be rejected"));
            }
            Decision::Reject => ContentStatus::Rejected,
        };

        let changed = self.repo.transition(id, status).await?;
        let newsletter = self.load(id).await?;
        tracing::info!(
            newsletter_id = id,
            reviewer_id = user.id,
            status = %status,
            changed,
            "Newsletter reviewed"
        );

        let notifications = if changed && status == ContentStatus::Published {
            Some(self.fan_out(&newsletter).await)
        } else {
            None
        };
        Ok(WorkflowOutcome {
            content: newsletter,
            notifications,
        })
    }

    /// Subscribe `user` directly. Returns false when already subscribed.
    pub async fn subscribe(&self, user: &User, id: i64) -> ServiceResult<bool> {
        require(user, Action::Subscribe)?;
        let newsletter = self.get(id, Some(user)).await?;
        if !newsletter.is_published() {
            return Err(ServiceError::not_found("Newsletter", id));
        }
        if !newsletter.is_active {
            return Err(ServiceError::conflict("This newsletter is no longer active"));
        }
        let created = self.repo.subscribe(id, user.id).await?;
        tracing::info!(newsletter_id = id, user_id = user.id, created, "Newsletter subscription");
        Ok(created)
    }

    pub async fn unsubscribe(&self, user: &User, id: i64) -> ServiceResult<bool> {
        require(user, Action::Subscribe)?;
        self.load(id).await?;
        Ok(self.repo.unsubscribe(id, user.id).await?)
    }

    /// Create a draft issue. Featured articles must be published and come
    /// from the newsletter's publisher, or from its author when independent.
    pub async fn create_issue(
        &self,
        user: &User,
        newsletter_id: i64,
        input: CreateIssueInput,
    ) -> ServiceResult<NewsletterIssue> {
        let newsletter = self.load(newsletter_id).await?;
        require_editor_of(
            self.publishers.as_ref(),
            user,
            newsletter.author_id,
            newsletter.publisher_id,
        )
        .await?;

        let mut errors = FieldErrors::new();
        if input.subject.trim().is_empty() {
            errors.add("subject", "This field is required.");
        }
        if input.body.trim().is_empty() {
            errors.add("body", "This field is required.");
        }

        let mut requested = input.featured_article_ids.clone();
        requested.sort_unstable();
        requested.dedup();
        if !requested.is_empty() {
            let eligible = match newsletter.publisher_id {
                Some(publisher_id) => {
                    self.articles
                        .published_ids_for_publisher(&requested, publisher_id)
                        .await?
                }
                None => {
                    self.articles
                        .published_ids_for_author(&requested, newsletter.author_id)
                        .await?
                }
            };
            for id in requested.iter().filter(|id| !eligible.contains(id)) {
                errors.add(
                    "featured_article_ids",
                    format!("Article {} is not a published article of this newsletter's source.", id),
                );
            }
        }
        errors.into_result()?;

        let issue = self.repo.create_issue(newsletter_id, &input).await?;
        tracing::info!(newsletter_id, issue_id = issue.id, "Newsletter issue created");
        Ok(issue)
    }

    /// Issues of a newsletter visible to `viewer`, newest first
    pub async fn list_issues(&self, newsletter_id: i64, viewer: Option<&User>) -> ServiceResult<Vec<NewsletterIssue>> {
        self.get(newsletter_id, viewer).await?;
        Ok(self.repo.list_issues(newsletter_id).await?)
    }

    /// Send a draft issue to the newsletter's audience
    pub async fn dispatch_issue(
        &self,
        user: &User,
        newsletter_id: i64,
        issue_id: i64,
    ) -> ServiceResult<WorkflowOutcome<NewsletterIssue>> {
        let newsletter = self.load(newsletter_id).await?;
        require_editor_of(
            self.publishers.as_ref(),
            user,
            newsletter.author_id,
            newsletter.publisher_id,
        )
        .await?;
        if !newsletter.is_published() || !newsletter.is_active {
            return Err(ServiceError::conflict(
                "Only published, active newsletters can be dispatched",
            ));
        }

        let issue = self
            .repo
            .get_issue(issue_id)
            .await?
            .filter(|issue| issue.newsletter_id == newsletter_id)
            .ok_or_else(|| ServiceError::not_found("Issue", issue_id))?;
        if !issue.is_draft || !self.repo.mark_issue_sent(issue_id).await? {
            return Err(ServiceError::conflict("This issue has already been sent"));
        }

        let report = self.notifications.issue_dispatched(&newsletter, &issue).await;
        let issue = self
            .repo
            .get_issue(issue_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Issue", issue_id))?;
        Ok(WorkflowOutcome {
            content: issue,
            notifications: Some(report),
        })
    }

    async fn load(&self, id: i64) -> ServiceResult<Newsletter> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Newsletter", id))
    }

    async fn fan_out(&self, newsletter: &Newsletter) -> FanOutReport {
        self.notifications
            .content_published(&Publication::from(newsletter))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::article::draft;
    use crate::db::repositories::test_support::{seed_publisher, seed_user, setup_pool};
    use crate::db::repositories::{
        SqlxArticleRepository, SqlxNewsletterRepository, SqlxPublisherRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::models::UserRole;
    use crate::services::notification::test_doubles::{
        notification_service, notification_service_with, RecordingNotifier, UnavailableSubscriptions,
    };

    fn service(pool: &DynDatabasePool, notifier: Arc<RecordingNotifier>) -> NewsletterService {
        NewsletterService::new(
            SqlxNewsletterRepository::boxed(pool.clone()),
            SqlxArticleRepository::boxed(pool.clone()),
            SqlxPublisherRepository::boxed(pool.clone()),
            notification_service(pool, notifier),
        )
    }

    fn input(title: &str) -> CreateNewsletterInput {
        CreateNewsletterInput {
            description: format!("{} description", title),
            ..CreateNewsletterInput::new(title, format!("{} subject", title))
        }
    }

    #[tokio::test]
    async fn test_create_requires_subject_and_description() {
        let pool = setup_pool().await;
        let bob = seed_user(&pool, "bob", None, UserRole::Editor).await;
        let service = service(&pool, Arc::default());

        match service.create(&bob, CreateNewsletterInput::new("Weekly", ""), None).await {
            Err(ServiceError::Validation(errors)) => {
                assert!(errors.contains("subject"));
                assert!(errors.contains("description"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reader_subscribes_to_published_newsletter() {
        let pool = setup_pool().await;
        let bob = seed_user(&pool, "bob", None, UserRole::Editor).await;
        let carol = seed_user(&pool, "carol", Some("carol@example.com"), UserRole::Reader).await;
        seed_publisher(&pool, "Daily", bob.id).await;
        let service = service(&pool, Arc::default());

        let draft = service.create(&bob, input("Weekly"), None).await.unwrap().content;
        assert!(matches!(
            service.subscribe(&carol, draft.id).await,
            Err(ServiceError::NotFound { .. })
        ));

        service.review(&bob, draft.id, Decision::Approve).await.unwrap();
        assert!(service.subscribe(&carol, draft.id).await.unwrap());
        assert!(!service.subscribe(&carol, draft.id).await.unwrap());
        assert!(matches!(
            service.subscribe(&bob, draft.id).await,
            Err(ServiceError::Forbidden(_))
        ));

        let paused = UpdateNewsletterInput {
            is_active: Some(false),
            ..Default::default()
        };
        service.update(&bob, draft.id, paused).await.unwrap();
        assert!(service.unsubscribe(&carol, draft.id).await.unwrap());
        assert!(matches!(
            service.subscribe(&carol, draft.id).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_issue_featured_articles_must_match_source() {
        let pool = setup_pool().await;
        let bob = seed_user(&pool, "bob", None, UserRole::Editor).await;
        let dana = seed_user(&pool, "dana", None, UserRole::Journalist).await;
        let daily = seed_publisher(&pool, "Daily", bob.id).await;
        let articles = SqlxArticleRepository::new(pool.clone());
        let own = articles.create(&draft("Own", bob.id, Some(daily.id))).await.unwrap();
        articles.transition(own.id, ContentStatus::Published).await.unwrap();
        let foreign = articles.create(&draft("Foreign", dana.id, None)).await.unwrap();
        articles.transition(foreign.id, ContentStatus::Published).await.unwrap();
        let unpublished = articles.create(&draft("Draft", bob.id, Some(daily.id))).await.unwrap();

        let service = service(&pool, Arc::default());
        let newsletter = service.create(&bob, input("Weekly"), None).await.unwrap().content;

        let bad = CreateIssueInput {
            subject: "Issue 1".to_string(),
            body: "Highlights".to_string(),
            featured_article_ids: vec![own.id, foreign.id, unpublished.id],
        };
        match service.create_issue(&bob, newsletter.id, bad).await {
            Err(ServiceError::Validation(errors)) => {
                assert_eq!(errors.get("featured_article_ids").unwrap().len(), 2);
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let good = CreateIssueInput {
            subject: "Issue 1".to_string(),
            body: "Highlights".to_string(),
            featured_article_ids: vec![own.id],
        };
        let issue = service.create_issue(&bob, newsletter.id, good).await.unwrap();
        assert_eq!(issue.featured_article_ids, vec![own.id]);
        assert!(issue.is_draft);
    }

    #[tokio::test]
    async fn test_dispatch_sends_once() {
        let pool = setup_pool().await;
        let bob = seed_user(&pool, "bob", None, UserRole::Editor).await;
        let carol = seed_user(&pool, "carol", Some("carol@example.com"), UserRole::Reader).await;
        seed_publisher(&pool, "Daily", bob.id).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service(&pool, notifier.clone());

        let created = input("Weekly").with_status(ContentStatus::Published);
        let newsletter = service.create(&bob, created, None).await.unwrap().content;
        service.subscribe(&carol, newsletter.id).await.unwrap();

        let issue = service
            .create_issue(
                &bob,
                newsletter.id,
                CreateIssueInput {
                    subject: "Issue 1".to_string(),
                    body: "This week".to_string(),
                    featured_article_ids: Vec::new(),
                },
            )
            .await
            .unwrap();

        let sent = service.dispatch_issue(&bob, newsletter.id, issue.id).await.unwrap();
        assert!(!sent.content.is_draft);
        assert!(sent.content.sent_at.is_some());
        assert_eq!(sent.notifications.unwrap().delivered, 1);
        let (_, subject, body) = notifier
            .messages()
            .into_iter()
            .find(|m| m.1 == "Issue 1")
            .unwrap();
        assert_eq!(subject, "Issue 1");
        assert!(body.contains("This week"));

        assert!(matches!(
            service.dispatch_issue(&bob, newsletter.id, issue.id).await,
            Err(ServiceError::Conflict(_))
        ));
        assert_eq!(service.list_issues(newsletter.id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_survives_audience_lookup_failure() {
        let pool = setup_pool().await;
        let bob = seed_user(&pool, "bob", None, UserRole::Editor).await;
        seed_publisher(&pool, "Daily", bob.id).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let service = NewsletterService::new(
            SqlxNewsletterRepository::boxed(pool.clone()),
            SqlxArticleRepository::boxed(pool.clone()),
            SqlxPublisherRepository::boxed(pool.clone()),
            notification_service_with(&pool, Arc::new(UnavailableSubscriptions), notifier.clone()),
        );

        let created = input("Weekly").with_status(ContentStatus::Published);
        let newsletter = service.create(&bob, created, None).await.unwrap().content;
        let issue = service
            .create_issue(
                &bob,
                newsletter.id,
                CreateIssueInput {
                    subject: "Issue 1".to_string(),
                    body: "This week".to_string(),
                    featured_article_ids: Vec::new(),
                },
            )
            .await
            .unwrap();

        let sent = service.dispatch_issue(&bob, newsletter.id, issue.id).await.unwrap();
        assert!(!sent.content.is_draft);
        assert_eq!(sent.notifications.unwrap().attempted, 0);
        assert!(notifier.messages().is_empty());
    }
}
