//! Lifecycle shared by articles and newsletters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Publication state of an article or newsletter.
///
/// Content is visible to subscribers and triggers notifications only once it
/// is `Published`; there is no separate approval flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    #[default]
    Draft,
    /// Submitted for editor review
    Pending,
    Published,
    Rejected,
}

impl ContentStatus {
    pub const ALL: [ContentStatus; 4] = [
        ContentStatus::Draft,
        ContentStatus::Pending,
        ContentStatus::Published,
        ContentStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Pending => "pending",
            ContentStatus::Published => "published",
            ContentStatus::Rejected => "rejected",
        }
    }

    /// States only reachable through an editor's review decision
    pub fn requires_review(&self) -> bool {
        matches!(self, ContentStatus::Published | ContentStatus::Rejected)
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(ContentStatus::Draft),
            "pending" => Ok(ContentStatus::Pending),
            "published" => Ok(ContentStatus::Published),
            "rejected" => Ok(ContentStatus::Rejected),
            _ => Err(anyhow::anyhow!("Invalid content status: {}", s)),
        }
    }
}

/// Which kind of publishable record a form or review targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Article,
    Newsletter,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Article => "article",
            ContentKind::Newsletter => "newsletter",
        }
    }

    /// Capitalized label used in notification templates
    pub fn label(&self) -> &'static str {
        match self {
            ContentKind::Article => "Article",
            ContentKind::Newsletter => "Newsletter",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "article" | "articles" => Ok(ContentKind::Article),
            "newsletter" | "newsletters" => Ok(ContentKind::Newsletter),
            _ => Err(anyhow::anyhow!("Invalid content kind: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        for status in ContentStatus::ALL {
            assert_eq!(status.as_str().parse::<ContentStatus>().unwrap(), status);
        }
        assert!("approved".parse::<ContentStatus>().is_err());
    }

    #[test]
    fn test_default_status_is_draft() {
        assert_eq!(ContentStatus::default(), ContentStatus::Draft);
    }

    #[test]
    fn test_review_only_states() {
        assert!(ContentStatus::Published.requires_review());
        assert!(ContentStatus::Rejected.requires_review());
        assert!(!ContentStatus::Draft.requires_review());
        assert!(!ContentStatus::Pending.requires_review());
    }

    #[test]
    fn test_kind_parsing_accepts_plural() {
        assert_eq!("articles".parse::<ContentKind>().unwrap(), ContentKind::Article);
        assert_eq!("Newsletter".parse::<ContentKind>().unwrap(), ContentKind::Newsletter);
        assert!("issue".parse::<ContentKind>().is_err());
    }
}
