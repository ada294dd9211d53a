//! Core data model: persisted artwork page records and the ephemeral
//! per-request parameter/result types threaded through the pipeline.

use chrono::{DateTime, Utc};

/// The submitting actor, as seen by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contributor {
    pub id: i64,
    pub name: String,
}

impl Contributor {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// HTML mention link for attribution text.
    pub fn mention_html(&self) -> String {
        format!(
            "<a href=\"tg://user?id={}\">{}</a>",
            self.id,
            artrelay_common::html_escape(&self.name)
        )
    }
}

/// One persisted artwork page. Identity is (platform, work_id, page); all
/// pages of one artwork share (platform, work_id).
#[derive(Debug, Clone)]
pub struct ArtworkRecord {
    /// Source platform label, e.g. "pixiv"
    pub platform: String,
    /// Source-platform-assigned identifier for the logical artwork
    pub work_id: String,
    /// 1-based page number within the artwork
    pub page: i64,
    /// Contributor user id
    pub user_id: i64,
    /// Contributor display name
    pub user_name: String,
    /// Work title; for microblog sources this is the post text
    pub title: String,
    /// Author display name on the source platform
    pub author: String,
    /// Author id on the source platform
    pub author_id: String,
    /// URL of the original full-resolution file
    pub url_original: String,
    /// URL of a reduced preview, roughly 1000-2500 px
    pub url_thumb: String,
    /// Local file name including extension
    pub file_name: String,
    pub extension: String,
    /// Byte size, if the source reported one or the download measured it
    pub size: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    /// Explicit-content flag
    pub explicit: bool,
    /// AI-generated flag
    pub ai_generated: bool,
    /// True for preview-only records not yet promoted by a canonical publish
    pub guest: bool,
    /// Raw source metadata blob (JSON); page 1 carries the full extraction
    /// product, later pages their per-page slice
    pub raw_meta: String,
    /// Telegram file_id of the already-uploaded preview, reused to avoid
    /// re-uploading bytes the destination has seen
    pub tg_file_thumb: Option<String>,
    /// Telegram file_id of the already-uploaded original document
    pub tg_file_original: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// How many times this artwork has been (re)posted
    pub post_count: i64,
}

impl ArtworkRecord {
    /// Local path of the downloaded original, relative to the download root.
    pub fn relative_path(&self) -> String {
        format!("{}/{}", self.platform, self.file_name)
    }
}

/// Optional parameters accompanying one submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtworkParam {
    /// Curated tags supplied by the submitting actor
    pub tags: Vec<String>,
    /// Optional page subset (1-based, sorted, deduplicated)
    pub pages: Option<Vec<u32>>,
    /// "from" attribution, e.g. an origin channel
    pub source_from: Option<String>,
    /// "via" attribution, e.g. a forwarding account
    pub source_via: Option<String>,
    /// Override notification suppression
    pub silent: Option<bool>,
    /// Override the spoiler cover (default follows the explicit flag)
    pub spoiler: Option<bool>,
    /// Explicit-content override: `nsfw=` forces true, `sfw=` forces false
    pub nsfw_override: Option<bool>,
}

/// Reference to a Telegram message held across pipeline and publish steps.
#[derive(Debug, Clone)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
    /// Public t.me link, when the chat has a username
    pub link: Option<String>,
}

/// Working state of one pipeline invocation, returned to the command layer.
#[derive(Debug, Default)]
pub struct ArtworkResult {
    pub success: bool,
    /// Operator-facing feedback for the submitting chat
    pub feedback: String,
    /// HTML caption for the published media group
    pub caption: String,
    /// Page records in page order
    pub records: Vec<ArtworkRecord>,
    /// Normalized curated tags, sorted
    pub tags: Vec<String>,
    /// Normalized platform tags, sorted
    pub raw_tags: Vec<String>,
    pub is_nsfw: bool,
    pub is_aigc: bool,
    /// True when the page records were reused from the cache
    pub cached: bool,
    /// In-flight status message, edited after the publish settles
    pub hint_msg: Option<MessageRef>,
    /// First message of the published media group
    pub published_msg: Option<MessageRef>,
    /// The request parameters, echoed through
    pub param: ArtworkParam,
}

impl ArtworkResult {
    /// A failed result carrying only feedback text.
    pub fn failure(feedback: impl Into<String>) -> Self {
        Self {
            success: false,
            feedback: feedback.into(),
            ..Self::default()
        }
    }
}
