//! Comment service
//!
//! Comments attach to published articles only. Replies point at a comment
//! of the same article; threads are assembled from the flat rows here.

use crate::db::repositories::{ArticleRepository, CommentRepository, PublisherRepository};
use crate::models::{Article, Comment, CommentThread, CreateCommentInput, User};
use crate::services::content::{can_view, require_owner};
use crate::services::error::{FieldErrors, ServiceError, ServiceResult};
use std::collections::HashMap;
use std::sync::Arc;

pub const MAX_COMMENT_LEN: usize = 5000;

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    articles: Arc<dyn ArticleRepository>,
    publishers: Arc<dyn PublisherRepository>,
}

impl CommentService {
    pub fn new(
        repo: Arc<dyn CommentRepository>,
        articles: Arc<dyn ArticleRepository>,
        publishers: Arc<dyn PublisherRepository>,
    ) -> Self {
        Self {
            repo,
            articles,
            publishers,
        }
    }

    pub async fn create(
        &self,
        user: &User,
        article_id: i64,
        input: CreateCommentInput,
    ) -> ServiceResult<Comment> {
        let article = self.visible_article(article_id, Some(user)).await?;
        if !article.is_published() {
            return Err(ServiceError::conflict("Comments are only open on published articles"));
        }

        let content = input.content.trim().to_string();
        let mut errors = FieldErrors::new();
        if content.is_empty() {
            errors.add("content", "This field may not be blank.");
        } else if content.chars().count() > MAX_COMMENT_LEN {
            errors.add(
                "content",
                format!("Ensure this field has no more than {} characters.", MAX_COMMENT_LEN),
            );
        }
        if let Some(parent_id) = input.parent_id {
            let parent = self.repo.get_by_id(parent_id).await?;
            if parent.map(|p| p.article_id) != Some(article_id) {
                errors.add("parent_id", "Reply to a comment on the same article.");
            }
        }
        errors.into_result()?;

        let comment = self
            .repo
            .create(
                article_id,
                user.id,
                &CreateCommentInput {
                    parent_id: input.parent_id,
                    content,
                },
            )
            .await?;
        tracing::info!(comment_id = comment.id, article_id, author_id = user.id, "Comment added");
        Ok(comment)
    }

    /// Threaded comments of an article, oldest first at every level
    pub async fn threads(&self, article_id: i64, viewer: Option<&User>) -> ServiceResult<Vec<CommentThread>> {
        self.visible_article(article_id, viewer).await?;
        let flat = self.repo.list_by_article(article_id).await?;
        Ok(build_threads(flat))
    }

    /// Delete a comment and its replies. Authors delete their own; admins any.
    pub async fn delete(&self, user: &User, id: i64) -> ServiceResult<()> {
        let comment = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Comment", id))?;
        require_owner(user, comment.author_id)?;
        self.repo.delete(id).await?;
        tracing::info!(comment_id = id, user_id = user.id, "Comment deleted");
        Ok(())
    }

    async fn visible_article(&self, id: i64, viewer: Option<&User>) -> ServiceResult<Article> {
        let article = self
            .articles
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Article", id))?;
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
}

/// Nest flat comments under their parents, keeping input order among siblings
pub fn build_threads(flat: Vec<CommentThread>) -> Vec<CommentThread> {
    let mut children: HashMap<Option<i64>, Vec<CommentThread>> = HashMap::new();
    for comment in flat {
        children.entry(comment.parent_id).or_default().push(comment);
    }

    fn attach(node: &mut CommentThread, children: &mut HashMap<Option<i64>, Vec<CommentThread>>) {
        if let Some(mut replies) = children.remove(&Some(node.id)) {
            for reply in replies.iter_mut() {
                attach(reply, children);
            }
            node.replies = replies;
        }
    }

    let mut roots = children.remove(&None).unwrap_or_default();
    for root in roots.iter_mut() {
        attach(root, &mut children);
    }
    roots
}
