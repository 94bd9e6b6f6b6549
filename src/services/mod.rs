//! Services layer - Business logic
//!
//! This module contains the business logic of the newsroom service.
//! Services are responsible for:
//! - Checking the acting user's capabilities
//! - Enforcing the content workflow and membership rules
//! - Coordinating repositories and the notification fan-out

pub mod article;
pub mod authorization;
pub mod comment;
pub mod content;
pub mod email;
pub mod error;
pub mod forms;
pub mod newsletter;
pub mod notification;
pub mod password;
pub mod publisher;
pub mod rate_limiter;
pub mod social;
pub mod subscription;
pub mod user;

pub use article::{ArticleService, Decision};
pub use authorization::{require, Action, Capability};
pub use comment::CommentService;
pub use content::WorkflowOutcome;
pub use email::{notifier_from_config, DynNotifier, LogNotifier, Notifier, SmtpNotifier};
pub use error::{FieldErrors, ServiceError, ServiceResult};
pub use forms::{ContentForm, ContentSubmission};
pub use newsletter::NewsletterService;
pub use notification::{FanOutReport, NotificationService, Publication};
pub use password::{generate_token, hash_password, verify_password};
pub use publisher::{PublisherDetails, PublisherService};
pub use rate_limiter::LoginRateLimiter;
pub use social::{announcer_from_config, Announcer, DisabledAnnouncer, DynAnnouncer, XAnnouncer};
pub use subscription::{SubscriptionService, Subscriptions};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
