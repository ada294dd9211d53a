//! Platform adapters.
//!
//! One pipeline serves several heterogeneous sources through a closed set of
//! tagged variants behind a shared capability interface: URL classification
//! picks a [`SourceKind`], each kind maps to a unit adapter implementing
//! [`SourceAdapter`], and shared default logic covers record building, tag
//! derivation, caption assembly and content download. Variants override only
//! where the source genuinely differs.

pub mod bilibili;
pub mod generic;
pub mod miyoushe;
pub mod pixiv;
pub mod twitter;

use crate::error::{AdapterError, AdapterResult};
use crate::models::{ArtworkParam, ArtworkRecord, Contributor};
use artrelay_common::{html_escape, Config};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Browser User-Agent presented to platform web APIs and file hosts.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/126.0.0.0 Safari/537.36";

/// Default timeout for extraction and download requests
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared context handed to every adapter call.
#[derive(Clone)]
pub struct AdapterContext {
    pub http: reqwest::Client,
    pub config: Arc<Config>,
}

impl AdapterContext {
    pub fn new(config: Arc<Config>) -> artrelay_common::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(BROWSER_USER_AGENT)
            .build()?;

        Ok(Self { http, config })
    }
}

/// Source classification. Exactly one variant matches a submission; generic
/// is the fallback for everything unrecognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pixiv,
    Twitter,
    Bilibili,
    Miyoushe,
    Generic,
}

impl SourceKind {
    /// Classify a submission string. A bare work id is treated as a Pixiv
    /// illust id, matching the submission shorthand the channel curators use.
    pub fn classify(url: &str) -> SourceKind {
        if url.contains("pixiv.net") || (!url.is_empty() && url.chars().all(|c| c.is_ascii_digit()))
        {
            SourceKind::Pixiv
        } else if url.contains("twitter.com") || url.contains("x.com") {
            SourceKind::Twitter
        } else if url.contains("miyoushe.com")
            || url.contains("bbs.mihoyo")
            || url.contains("hoyolab")
        {
            SourceKind::Miyoushe
        } else if url.contains("bilibili.com") {
            SourceKind::Bilibili
        } else {
            SourceKind::Generic
        }
    }

    /// The adapter implementing this source.
    pub fn adapter(self) -> &'static dyn SourceAdapter {
        match self {
            SourceKind::Pixiv => &pixiv::Pixiv,
            SourceKind::Twitter => &twitter::Twitter,
            SourceKind::Bilibili => &bilibili::Bilibili,
            SourceKind::Miyoushe => &miyoushe::Miyoushe,
            SourceKind::Generic => &generic::Generic,
        }
    }
}

/// Normalized extraction product: everything the rest of the pipeline needs,
/// independent of the source's own metadata shape. Serialized into the page-1
/// raw-metadata blob so cache hits can re-derive tags and caption without
/// re-extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawInfo {
    pub work_id: String,
    pub title: String,
    pub author: String,
    pub author_id: String,
    /// Canonical page URL used for the caption source link
    pub source_url: String,
    pub author_url: String,
    /// Platform-native explicit-content flag
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Platform tags, unnormalized
    #[serde(default)]
    pub raw_tags: Vec<String>,
    pub pages: Vec<RawPage>,
    /// Source metadata carried through for auditability
    #[serde(default)]
    pub meta: serde_json::Value,
}

/// One page of the extraction product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPage {
    pub url_original: String,
    #[serde(default)]
    pub url_thumb: String,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub meta: serde_json::Value,
}

/// Normalized tag sets plus the derived classification flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagDerivation {
    /// Curated tags (submitted by the actor), sorted
    pub curated: Vec<String>,
    /// Platform tags, sorted
    pub raw: Vec<String>,
    pub is_aigc: bool,
    pub is_nsfw: bool,
}

/// Capability interface shared by every source variant.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable platform label; record identity and download paths key on it.
    fn platform(&self) -> &'static str;

    /// Name shown in captions.
    fn display_name(&self) -> &'static str {
        self.platform()
    }

    /// Referer header required by the platform's file host, if any.
    fn download_referer(&self) -> Option<&'static str> {
        None
    }

    /// Work id recoverable from the URL alone. Sources whose ids only appear
    /// in extracted metadata return `None`; those submissions consult the
    /// dedup/cache store after extraction instead of before.
    fn work_id_from_url(&self, url: &str) -> Option<String>;

    /// Fetch raw metadata plus the page list for a submission.
    async fn extract(&self, ctx: &AdapterContext, url: &str) -> AdapterResult<RawInfo>;

    /// Map the extraction product onto canonical page records.
    fn build_records(
        &self,
        raw: &RawInfo,
        contributor: &Contributor,
        canonical: bool,
        param: &ArtworkParam,
        now: DateTime<Utc>,
    ) -> Vec<ArtworkRecord> {
        build_records_default(self.platform(), raw, contributor, canonical, param, now)
    }

    /// Derive normalized tag sets and classification flags.
    fn derive_tags(&self, raw: &RawInfo, param: &ArtworkParam) -> TagDerivation {
        derive_tags_default(raw, param)
    }

    /// Compose the HTML caption.
    fn build_caption(&self, raw: &RawInfo, tags: &TagDerivation, param: &ArtworkParam) -> String {
        build_caption_default(self.display_name(), raw, tags, param)
    }
}

// ============================================================================
// Shared default logic
// ============================================================================

/// Normalize one curated tag: short tokens upper-cased, `#` prefix, escaped.
pub fn normalize_curated_tag(tag: &str) -> String {
    let mut token = tag.trim().trim_start_matches('#').to_string();
    if token.chars().count() <= 4 {
        token = token.to_uppercase();
    }
    format!("#{}", html_escape(&token))
}

/// Normalize one platform tag: whitespace and hyphens become underscores.
pub fn normalize_raw_tag(tag: &str) -> String {
    let token = tag.trim().trim_start_matches('#').replace([' ', '-'], "_");
    format!("#{}", html_escape(&token))
}

const NSFW_MARKERS: [&str; 3] = ["#NSFW", "#R18", "#R-18"];

/// Shared tag derivation.
///
/// A tag marks the artwork only when the submitting actor and the platform
/// agree on it: the classification flags come from the intersection of the
/// two normalized sets. The platform-native explicit flag and an explicit
/// `nsfw=`/`sfw=` override are applied on top.
pub fn derive_tags_default(raw: &RawInfo, param: &ArtworkParam) -> TagDerivation {
    let curated: BTreeSet<String> = param.tags.iter().map(|t| normalize_curated_tag(t)).collect();
    let raw_set: BTreeSet<String> = raw.raw_tags.iter().map(|t| normalize_raw_tag(t)).collect();

    let agreed: BTreeSet<String> = curated.intersection(&raw_set).cloned().collect();
    let is_aigc = agreed.contains("#AI");
    let mut is_nsfw = NSFW_MARKERS.iter().any(|marker| agreed.contains(*marker)) || raw.explicit;
    if let Some(forced) = param.nsfw_override {
        is_nsfw = forced;
    }

    TagDerivation {
        curated: curated.into_iter().collect(),
        raw: raw_set.into_iter().collect(),
        is_aigc,
        is_nsfw,
    }
}

/// Shared caption assembly: optional bold title, source/author links,
/// optional attribution line, curated tags, then an expandable block with the
/// platform tags and the creation timestamp.
pub fn build_caption_default(
    platform: &str,
    raw: &RawInfo,
    tags: &TagDerivation,
    param: &ArtworkParam,
) -> String {
    let mut caption = String::new();

    let escaped_title = html_escape(&raw.title);
    let title_as_tag = format!("#{escaped_title}");
    // Skip the title line when a tag already carries it
    if !raw.title.is_empty()
        && !tags.curated.contains(&title_as_tag)
        && !tags.raw.contains(&title_as_tag)
    {
        caption.push_str(&format!("<b>{escaped_title}</b>\n"));
    }

    if !raw.source_url.is_empty() {
        caption.push_str(&format!("<a href=\"{}\">Source</a>", raw.source_url));
        if !raw.author.is_empty() {
            let escaped_author = html_escape(&raw.author);
            if raw.author_url.is_empty() {
                caption.push_str(&format!(" by {platform} @{escaped_author}"));
            } else {
                caption.push_str(&format!(
                    " by <a href=\"{}\">{platform} @{escaped_author}</a>",
                    raw.author_url
                ));
            }
        }
        caption.push('\n');
    }

    match (&param.source_from, &param.source_via) {
        (Some(from), Some(via)) => caption.push_str(&format!(
            "from {} via {}\n",
            html_escape(from),
            html_escape(via)
        )),
        (Some(from), None) => caption.push_str(&format!("from {}\n", html_escape(from))),
        (None, Some(via)) => caption.push_str(&format!("via {}\n", html_escape(via))),
        (None, None) => {}
    }

    if !tags.curated.is_empty() {
        caption.push_str(&format!("Tags: {}\n", tags.curated.join(" ")));
    }

    if !tags.raw.is_empty() || raw.created_at.is_some() {
        caption.push_str("<blockquote expandable>");
        if !tags.raw.is_empty() {
            caption.push_str(&format!("Raw Tags: {}", tags.raw.join(" ")));
        }
        if let Some(created_at) = raw.created_at {
            if !tags.raw.is_empty() {
                caption.push('\n');
            }
            caption.push_str(&created_at.format("%Y-%m-%d %H:%M:%S").to_string());
        }
        caption.push_str("</blockquote>\n");
    }

    caption
}

/// Shared record building: one record per selected page, defaults resolved
/// from the normalized page entries.
pub fn build_records_default(
    platform: &str,
    raw: &RawInfo,
    contributor: &Contributor,
    canonical: bool,
    param: &ArtworkParam,
    now: DateTime<Utc>,
) -> Vec<ArtworkRecord> {
    let selected: Vec<usize> = match &param.pages {
        Some(pages) => pages
            .iter()
            .filter(|&&p| p >= 1 && (p as usize) <= raw.pages.len())
            .map(|&p| p as usize - 1)
            .collect(),
        None => (0..raw.pages.len()).collect(),
    };

    let mut records = Vec::with_capacity(selected.len());
    for index in selected {
        let page = &raw.pages[index];
        let page_no = (index + 1) as i64;
        let extension = if page.extension.is_empty() {
            extension_from_url(&page.url_original)
        } else {
            page.extension.clone()
        };
        // Page 1 carries the whole extraction product so cache hits can
        // re-derive tags and caption; later pages keep their own slice.
        let raw_meta = if page_no == 1 {
            serde_json::to_string(raw).unwrap_or_else(|_| "{}".to_string())
        } else {
            page.meta.to_string()
        };

        records.push(ArtworkRecord {
            platform: platform.to_string(),
            work_id: raw.work_id.clone(),
            page: page_no,
            user_id: contributor.id,
            user_name: contributor.name.clone(),
            title: raw.title.clone(),
            author: raw.author.clone(),
            author_id: raw.author_id.clone(),
            url_original: page.url_original.clone(),
            url_thumb: if page.url_thumb.is_empty() {
                page.url_original.clone()
            } else {
                page.url_thumb.clone()
            },
            file_name: format!("{}_{}.{}", raw.work_id, page_no, extension),
            extension,
            size: page.size,
            width: page.width,
            height: page.height,
            explicit: raw.explicit,
            ai_generated: false,
            guest: !canonical,
            raw_meta,
            tg_file_thumb: None,
            tg_file_original: None,
            created_at: now,
            updated_at: now,
            post_count: 1,
        });
    }

    records
}

/// File extension taken from the URL path, query stripped; `jpg` fallback.
pub fn extension_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    match last_segment.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 5 => ext.to_ascii_lowercase(),
        _ => "jpg".to_string(),
    }
}

/// Local path of a record's downloaded original.
pub fn local_path(config: &Config, record: &ArtworkRecord) -> PathBuf {
    config.download_dir.join(record.relative_path())
}

/// Download one page's original file. Idempotent: an already-downloaded file
/// is left alone. Returns the measured byte size of a fresh download.
///
/// A failure is logged here and swallowed; one stalled or broken page must
/// not fail the whole pipeline invocation.
pub async fn fetch_content(
    ctx: &AdapterContext,
    record: &ArtworkRecord,
    referer: Option<&str>,
) -> Option<i64> {
    match download_original(ctx, record, referer).await {
        Ok(size) => size,
        Err(e) => {
            tracing::warn!(
                platform = %record.platform,
                work_id = %record.work_id,
                page = record.page,
                error = %e,
                "page download failed"
            );
            None
        }
    }
}

async fn download_original(
    ctx: &AdapterContext,
    record: &ArtworkRecord,
    referer: Option<&str>,
) -> AdapterResult<Option<i64>> {
    let dir = ctx.config.download_dir.join(&record.platform);
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(&record.file_name);
    if path.exists() {
        return Ok(None);
    }

    let mut request = ctx
        .http
        .get(&record.url_original)
        .header(header::ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9,en;q=0.8");
    if let Some(referer) = referer {
        request = request.header(header::REFERER, referer);
    }

    let response = request.send().await?.error_for_status()?;
    let bytes = response.bytes().await?;
    tokio::fs::write(&path, &bytes).await?;
    tracing::debug!(file = %record.file_name, "downloaded");

    Ok(Some(bytes.len() as i64))
}
