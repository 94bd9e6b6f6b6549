//! Data models
//!
//! Database entities of the newsroom service plus the request/response
//! types that travel with them.

mod article;
mod comment;
mod content;
mod invitation;
mod join_request;
mod newsletter;
mod publisher;
mod session;
mod user;

pub use article::{
    Article, CreateArticleInput, FeedArticle, ListParams, PagedResult, UpdateArticleInput,
};
pub use comment::{Comment, CommentThread, CreateCommentInput};
pub use content::{ContentKind, ContentStatus};
pub use invitation::{CollaborationInvitation, CreateInvitationInput};
pub use join_request::{JoinRequest, JoinRequestStatus};
pub use newsletter::{
    CreateIssueInput, CreateNewsletterInput, Newsletter, NewsletterIssue, UpdateNewsletterInput,
};
pub use publisher::{CreatePublisherInput, Membership, Publisher, PublisherMember};
pub use session::Session;
pub use user::{normalize_email, User, UserRole};
