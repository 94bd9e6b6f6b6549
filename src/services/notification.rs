//! Publish notification fan-out
//!
//! Runs after content has been committed as published. Every subscriber with
//! an email gets one message through the [`Notifier`]; a single social
//! announcement goes through the [`Announcer`]. Delivery problems are logged
//! and counted in the [`FanOutReport`], never returned to the caller.
//!
//! Each attempt is capped by `attempt_timeout`, the whole fan-out by
//! `total_budget`, and at most `concurrency` sends are in flight.

use crate::config::NotifyConfig;
use crate::db::repositories::{NewsletterRepository, SubscriptionRepository, UserRepository};
use crate::models::{Article, ContentKind, Newsletter, NewsletterIssue, User};
use crate::services::email::DynNotifier;
use crate::services::social::DynAnnouncer;
use anyhow::Result;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};

/// What happened during one fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FanOutReport {
    /// Sends actually started
    pub attempted: usize,
    pub delivered: usize,
    /// Errors and timeouts
    pub failed: usize,
    pub skipped_no_email: usize,
    /// Recipients left when the overall budget ran out
    pub skipped_budget: usize,
    pub announced: bool,
}

/// The published record, reduced to what notifications need
#[derive(Debug, Clone)]
pub struct Publication {
    pub kind: ContentKind,
    pub id: i64,
    pub title: String,
    pub author_id: i64,
    pub publisher_id: Option<i64>,
}

impl From<&Article> for Publication {
    fn from(article: &Article) -> Self {
        Self {
            kind: ContentKind::Article,
            id: article.id,
            title: article.title.clone(),
            author_id: article.author_id,
            publisher_id: article.publisher_id,
        }
    }
}

impl From<&Newsletter> for Publication {
    fn from(newsletter: &Newsletter) -> Self {
        Self {
            kind: ContentKind::Newsletter,
            id: newsletter.id,
            title: newsletter.title.clone(),
            author_id: newsletter.author_id,
            publisher_id: newsletter.publisher_id,
        }
    }
}

pub fn email_subject(publication: &Publication) -> String {
    format!("New {}: {}", publication.kind.label(), publication.title)
}

pub fn email_body(publication: &Publication, recipient: &str, author: &str) -> String {
    format!(
        "Hi {}!\n\nA new {} has been published: {}\nWritten by {}.\n\nYou receive this because you follow its publisher or author.",
        recipient, publication.kind, publication.title, author
    )
}

pub fn announcement_text(publication: &Publication, author: &str) -> String {
    format!(
        "New {} Added: {}, by: {}",
        publication.kind.label(),
        publication.title,
        author
    )
}

enum Outcome {
    Delivered,
    Failed,
    OutOfBudget,
}

/// A rendered message for one recipient
struct Envelope {
    to: String,
    subject: String,
    body: String,
}

pub struct NotificationService {
    subscriptions: Arc<dyn SubscriptionRepository>,
    newsletters: Arc<dyn NewsletterRepository>,
    users: Arc<dyn UserRepository>,
    notifier: DynNotifier,
    announcer: DynAnnouncer,
    limits: NotifyConfig,
}

impl NotificationService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        newsletters: Arc<dyn NewsletterRepository>,
        users: Arc<dyn UserRepository>,
        notifier: DynNotifier,
        announcer: DynAnnouncer,
        limits: NotifyConfig,
    ) -> Self {
        Self {
            subscriptions,
            newsletters,
            users,
            notifier,
            announcer,
            limits,
        }
    }

    /// Subscribers of the publisher, or of the author for independent content.
    /// Newsletters add their direct subscribers. One entry per user.
    pub async fn audience(&self, publication: &Publication) -> Result<Vec<User>> {
        let mut audience: BTreeMap<i64, User> = BTreeMap::new();
        let followers = match publication.publisher_id {
            Some(publisher_id) => self.subscriptions.publisher_subscribers(publisher_id).await?,
            None => self.subscriptions.journalist_subscribers(publication.author_id).await?,
        };
        audience.extend(followers.into_iter().map(|u| (u.id, u)));

        if publication.kind == ContentKind::Newsletter {
            let direct = self.newsletters.subscribers(publication.id).await?;
            audience.extend(direct.into_iter().map(|u| (u.id, u)));
        }
        Ok(audience.into_values().collect())
    }

    /// Notify the audience of freshly published content and announce it
    pub async fn content_published(&self, publication: &Publication) -> FanOutReport {
        let author = self.author_name(publication.author_id).await;
        let audience = match self.audience(publication).await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(kind = %publication.kind, id = publication.id, "Failed to resolve subscribers: {:#}", e);
                Vec::new()
            }
        };

        let subject = email_subject(publication);
        let mut report = self
            .deliver(&audience, |user| Envelope {
                to: String::new(),
                subject: subject.clone(),
                body: email_body(publication, &user.username, &author),
            })
            .await;

        let text = announcement_text(publication, &author);
        report.announced = match timeout(self.limits.attempt_timeout(), self.announcer.announce(&text)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(id = publication.id, "Announcement failed: {:#}", e);
                false
            }
            Err(_) => {
                tracing::warn!(id = publication.id, "Announcement timed out");
                false
            }
        };

        tracing::info!(
            kind = %publication.kind,
            id = publication.id,
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            skipped_no_email = report.skipped_no_email,
            skipped_budget = report.skipped_budget,
            announced = report.announced,
            "Publish fan-out finished"
        );
        report
    }

    /// Send a newsletter issue to the newsletter's audience
    pub async fn issue_dispatched(&self, newsletter: &Newsletter, issue: &NewsletterIssue) -> FanOutReport {
        let audience = match self.audience(&Publication::from(newsletter)).await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(
                    newsletter_id = newsletter.id,
                    issue_id = issue.id,
                    "Failed to resolve subscribers: {:#}",
                    e
                );
                Vec::new()
            }
        };
        let report = self
            .deliver(&audience, |user| Envelope {
                to: String::new(),
                subject: issue.subject.clone(),
                body: format!("Hi {}!\n\n{}", user.username, issue.body),
            })
            .await;
        tracing::info!(
            newsletter_id = newsletter.id,
            issue_id = issue.id,
            delivered = report.delivered,
            failed = report.failed,
            "Newsletter issue dispatched"
        );
        report
    }

    async fn author_name(&self, author_id: i64) -> String {
        match self.users.get_by_id(author_id).await {
            Ok(Some(user)) => user.username,
            Ok(None) => format!("user {}", author_id),
            Err(e) => {
                tracing::warn!(author_id, "Failed to load author: {:#}", e);
                format!("user {}", author_id)
            }
        }
    }

    async fn deliver<F>(&self, audience: &[User], render: F) -> FanOutReport
    where
        F: Fn(&User) -> Envelope,
    {
        let mut report = FanOutReport::default();
        let mut envelopes = Vec::with_capacity(audience.len());
        for user in audience {
            match user.contact_address() {
                Some(address) => envelopes.push(Envelope {
                    to: address.to_string(),
                    ..render(user)
                }),
                None => {
                    tracing::debug!(user_id = user.id, "Skipping subscriber without email");
                    report.skipped_no_email += 1;
                }
            }
        }

        let deadline = Instant::now() + self.limits.total_budget();
        let attempt_timeout = self.limits.attempt_timeout();
        let notifier = &self.notifier;

        let outcomes: Vec<Outcome> = stream::iter(envelopes)
            .map(|envelope| async move {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining == Duration::ZERO {
                    return Outcome::OutOfBudget;
                }
                let send = notifier.send(&envelope.to, &envelope.subject, &envelope.body);
                match timeout(attempt_timeout.min(remaining), send).await {
                    Ok(Ok(())) => Outcome::Delivered,
                    Ok(Err(e)) => {
                        tracing::warn!(to = %envelope.to, "Notification failed: {:#}", e);
                        Outcome::Failed
                    }
                    Err(_) => {
                        tracing::warn!(to = %envelope.to, "Notification timed out");
                        Outcome::Failed
                    }
                }
            })
            .buffer_unordered(self.limits.concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Outcome::Delivered => {
                    report.attempted += 1;
                    report.delivered += 1;
                }
                Outcome::Failed => {
                    report.attempted += 1;
                    report.failed += 1;
                }
                Outcome::OutOfBudget => report.skipped_budget += 1,
            }
        }
        report
    }
}

#[cfg(test)]
pub(crate) mod test_doubles {
    use super::NotificationService;
    use crate::config::NotifyConfig;
    use crate::db::repositories::{
        SqlxNewsletterRepository, SqlxSubscriptionRepository, SqlxUserRepository, SubscriptionRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::models::{FeedArticle, User};
    use crate::services::email::Notifier;
    use crate::services::social::Announcer;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Fan-out over `pool` delivering into `notifier`, announcements dropped
    pub fn notification_service(pool: &DynDatabasePool, notifier: Arc<RecordingNotifier>) -> Arc<NotificationService> {
        notification_service_with(pool, SqlxSubscriptionRepository::boxed(pool.clone()), notifier)
    }

    pub fn notification_service_with(
        pool: &DynDatabasePool,
        subscriptions: Arc<dyn SubscriptionRepository>,
        notifier: Arc<RecordingNotifier>,
    ) -> Arc<NotificationService> {
        Arc::new(NotificationService::new(
            subscriptions,
            SqlxNewsletterRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            notifier,
            Arc::new(RecordingAnnouncer::default()),
            NotifyConfig::default(),
        ))
    }

    /// Records every message; addresses in `failing` error out, `slow` ones hang
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(String, String, String)>>,
        pub failing: HashSet<String>,
        pub slow: HashSet<String>,
    }

    impl RecordingNotifier {
        pub fn failing(addresses: &[&str]) -> Self {
            Self {
                failing: addresses.iter().map(|a| a.to_string()).collect(),
                ..Self::default()
            }
        }

        pub fn slow(addresses: &[&str]) -> Self {
            Self {
                slow: addresses.iter().map(|a| a.to_string()).collect(),
                ..Self::default()
            }
        }

        pub fn recipients(&self) -> Vec<String> {
            let mut to: Vec<String> = self.sent.lock().unwrap().iter().map(|m| m.0.clone()).collect();
            to.sort();
            to
        }

        pub fn messages(&self) -> Vec<(String, String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
            if self.slow.contains(to) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if self.failing.contains(to) {
                return Err(anyhow!("mailbox unavailable"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    /// Subscription store whose every query fails
    pub struct UnavailableSubscriptions;

    #[async_trait]
    impl SubscriptionRepository for UnavailableSubscriptions {
        async fn subscribe_publisher(&self, _: i64, _: i64) -> Result<bool> {
            Err(anyhow!("database is locked"))
        }

        async fn unsubscribe_publisher(&self, _: i64, _: i64) -> Result<bool> {
            Err(anyhow!("database is locked"))
        }

        async fn subscribe_journalist(&self, _: i64, _: i64) -> Result<bool> {
            Err(anyhow!("database is locked"))
        }

        async fn unsubscribe_journalist(&self, _: i64, _: i64) -> Result<bool> {
            Err(anyhow!("database is locked"))
        }

        async fn subscribed_publishers(&self, _: i64) -> Result<Vec<i64>> {
            Err(anyhow!("database is locked"))
        }

        async fn subscribed_journalists(&self, _: i64) -> Result<Vec<i64>> {
            Err(anyhow!("database is locked"))
        }

        async fn publisher_subscribers(&self, _: i64) -> Result<Vec<User>> {
            Err(anyhow!("database is locked"))
        }

        async fn journalist_subscribers(&self, _: i64) -> Result<Vec<User>> {
            Err(anyhow!("database is locked"))
        }

        async fn feed_for(&self, _: i64) -> Result<Vec<FeedArticle>> {
            Err(anyhow!("database is locked"))
        }
    }

    #[derive(Default)]
    pub struct RecordingAnnouncer {
        pub posts: Mutex<Vec<String>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Announcer for RecordingAnnouncer {
        async fn announce(&self, text: &str) -> Result<()> {
            if self.fail {
                return Err(anyhow!("rate limited"));
            }
            self.posts.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }
}
