//! Per-post metadata records and field-wise merge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::reports::ReportSummary;

/// Moderation state of a submission as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    /// No moderator has acted on the post.
    #[default]
    Unmoderated,
    /// Approved by a moderator.
    Approved,
    /// Removed by a moderator.
    Removed,
}

/// Cached knowledge about one Reddit submission.
///
/// A record is created when a post's media is first committed and
/// updated whenever media is added, moderation state changes, or
/// reports are fetched. Updates are last-write-wins per field; fields
/// an update omits are preserved (see [`MetadataUpdate`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostMetadata {
    /// Unique post ID (e.g. `abc123`).
    pub id: String,
    /// Post author, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Post title, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Portable relative cache keys (`domain/filename`) of this post's
    /// media. Gallery posts have several.
    #[serde(default)]
    pub media_paths: Vec<String>,
    /// Final direct media URL after redirect/provider resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_url: Option<String>,
    /// Last observed moderation state.
    #[serde(default)]
    pub moderation: ModerationStatus,
    /// Normalized report summary, when fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reports: Option<ReportSummary>,
    /// Post score at last check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    /// Comment count at last check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_comments: Option<u64>,
    /// When this record was last written.
    pub last_updated_utc: DateTime<Utc>,
}

impl PostMetadata {
    /// Create an empty record for a post ID, timestamped now.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            author: None,
            title: None,
            media_paths: Vec::new(),
            resolved_url: None,
            moderation: ModerationStatus::default(),
            reports: None,
            score: None,
            num_comments: None,
            last_updated_utc: Utc::now(),
        }
    }

    /// Merge an update into this record.
    ///
    /// Supplied fields overwrite, omitted fields are preserved, media
    /// paths are appended without duplicates. The timestamp always
    /// advances. This is what lets one worker update the media path
    /// while another updates moderation state without clobbering.
    pub fn apply(&mut self, update: MetadataUpdate) {
        if let Some(author) = update.author {
            self.author = Some(author);
        }
        if let Some(title) = update.title {
            self.title = Some(title);
        }
        for path in update.add_media_paths {
            if !self.media_paths.contains(&path) {
                self.media_paths.push(path);
            }
        }
        if let Some(url) = update.resolved_url {
            self.resolved_url = Some(url);
        }
        if let Some(moderation) = update.moderation {
            self.moderation = moderation;
        }
        if let Some(reports) = update.reports {
            self.reports = Some(reports);
        }
        if let Some(score) = update.score {
            self.score = Some(score);
        }
        if let Some(num_comments) = update.num_comments {
            self.num_comments = Some(num_comments);
        }
        self.last_updated_utc = Utc::now();
    }
}

/// Partial update for a post's metadata.
///
/// `None` / empty fields mean "leave unchanged". Built with the `with_*`
/// helpers:
///
/// ```
/// use redcache::metadata::{MetadataUpdate, ModerationStatus};
///
/// let update = MetadataUpdate::new()
///     .with_moderation(ModerationStatus::Approved)
///     .with_score(42);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    /// New author, if any.
    pub author: Option<String>,
    /// New title, if any.
    pub title: Option<String>,
    /// Media paths to append (deduplicated on apply).
    pub add_media_paths: Vec<String>,
    /// New resolved URL, if any.
    pub resolved_url: Option<String>,
    /// New moderation state, if any.
    pub moderation: Option<ModerationStatus>,
    /// New report summary, if any.
    pub reports: Option<ReportSummary>,
    /// New score, if any.
    pub score: Option<i64>,
    /// New comment count, if any.
    pub num_comments: Option<u64>,
}

impl MetadataUpdate {
    /// An update that changes nothing (still bumps the timestamp).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the author.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Set the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Append a media path.
    #[must_use]
    pub fn with_media_path(mut self, path: impl Into<String>) -> Self {
        self.add_media_paths.push(path.into());
        self
    }

    /// Set the resolved URL.
    #[must_use]
    pub fn with_resolved_url(mut self, url: impl Into<String>) -> Self {
        self.resolved_url = Some(url.into());
        self
    }

    /// Set the moderation state.
    #[must_use]
    pub fn with_moderation(mut self, moderation: ModerationStatus) -> Self {
        self.moderation = Some(moderation);
        self
    }

    /// Set the report summary.
    #[must_use]
    pub fn with_reports(mut self, reports: ReportSummary) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Set the score.
    #[must_use]
    pub fn with_score(mut self, score: i64) -> Self {
        self.score = Some(score);
        self
    }

    /// Set the comment count.
    #[must_use]
    pub fn with_num_comments(mut self, num_comments: u64) -> Self {
        self.num_comments = Some(num_comments);
        self
    }
}
