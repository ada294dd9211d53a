//! Pixiv adapter (image-board style).
//!
//! Uses the pixiv web ajax API: `/ajax/illust/{id}` for work metadata and
//! `/ajax/illust/{id}/pages` for the per-page URL and dimension list. The
//! session cookie from the configuration unlocks the works an anonymous
//! visitor cannot see. File downloads require the pixiv referer.

use super::{AdapterContext, RawInfo, RawPage, SourceAdapter};
use crate::error::{AdapterError, AdapterResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header;
use serde::Deserialize;

const AJAX_BASE: &str = "https://www.pixiv.net/ajax";
const PIXIV_REFERER: &str = "https://www.pixiv.net/";

/// Marker value of the ajax `aiType` field for AI-generated works
const AI_TYPE_GENERATED: i64 = 2;

pub struct Pixiv;

#[derive(Debug, Deserialize)]
struct AjaxEnvelope {
    error: bool,
    #[serde(default)]
    message: String,
    body: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IllustBody {
    title: String,
    user_name: String,
    user_id: String,
    #[serde(default)]
    x_restrict: i64,
    #[serde(default)]
    ai_type: i64,
    #[serde(default)]
    create_date: Option<String>,
    #[serde(default)]
    tags: Option<TagsBlock>,
}

#[derive(Debug, Deserialize)]
struct TagsBlock {
    #[serde(default)]
    tags: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    tag: String,
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    urls: PageUrls,
    #[serde(default)]
    width: Option<i64>,
    #[serde(default)]
    height: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PageUrls {
    original: String,
    #[serde(default)]
    regular: String,
}

impl Pixiv {
    async fn ajax_get(&self, ctx: &AdapterContext, path: &str) -> AdapterResult<serde_json::Value> {
        let mut request = ctx
            .http
            .get(format!("{AJAX_BASE}{path}"))
            .header(header::REFERER, PIXIV_REFERER);
        if let Some(session) = &ctx.config.pixiv_session {
            request = request.header(header::COOKIE, format!("PHPSESSID={session}"));
        }

        let response = request.send().await?.error_for_status()?;
        let envelope: AjaxEnvelope = response
            .json()
            .await
            .map_err(|e| AdapterError::Parse(format!("pixiv ajax response: {e}")))?;

        if envelope.error {
            return Err(AdapterError::Parse(format!(
                "pixiv ajax error: {}",
                envelope.message
            )));
        }
        envelope
            .body
            .ok_or_else(|| AdapterError::Parse("pixiv ajax response without body".to_string()))
    }
}

#[async_trait]
impl SourceAdapter for Pixiv {
    fn platform(&self) -> &'static str {
        "pixiv"
    }

    fn display_name(&self) -> &'static str {
        "Pixiv"
    }

    fn download_referer(&self) -> Option<&'static str> {
        Some(PIXIV_REFERER)
    }

    fn work_id_from_url(&self, url: &str) -> Option<String> {
        // Bare illust id shorthand
        if !url.is_empty() && url.chars().all(|c| c.is_ascii_digit()) {
            return Some(url.to_string());
        }

        let path = url.split(['?', '#']).next().unwrap_or(url);
        let segment = path.trim_end_matches('/').rsplit('/').next()?;
        (!segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()))
            .then(|| segment.to_string())
    }

    async fn extract(&self, ctx: &AdapterContext, url: &str) -> AdapterResult<RawInfo> {
        let work_id = self
            .work_id_from_url(url)
            .ok_or_else(|| AdapterError::Parse(format!("no illust id in {url:?}")))?;

        let illust_value = self.ajax_get(ctx, &format!("/illust/{work_id}")).await?;
        let illust: IllustBody = serde_json::from_value(illust_value.clone())
            .map_err(|e| AdapterError::Parse(format!("pixiv illust body: {e}")))?;

        let pages_value = self.ajax_get(ctx, &format!("/illust/{work_id}/pages")).await?;
        let entries: Vec<PageEntry> = serde_json::from_value(pages_value)
            .map_err(|e| AdapterError::Parse(format!("pixiv page list: {e}")))?;
        if entries.is_empty() {
            return Err(AdapterError::Parse(format!(
                "pixiv work {work_id} has no pages"
            )));
        }

        let mut raw_tags: Vec<String> = illust
            .tags
            .map(|block| block.tags.into_iter().map(|entry| entry.tag).collect())
            .unwrap_or_default();
        // The web UI shows AI-generated works with a platform label; surface
        // it as a platform tag so the shared derivation sees it
        if illust.ai_type == AI_TYPE_GENERATED {
            raw_tags.push("AI".to_string());
        }

        let created_at = illust
            .create_date
            .as_deref()
            .and_then(|date| DateTime::parse_from_rfc3339(date).ok())
            .map(|date| date.with_timezone(&Utc));

        let pages = entries
            .into_iter()
            .map(|entry| {
                let extension = super::extension_from_url(&entry.urls.original);
                RawPage {
                    url_original: entry.urls.original,
                    url_thumb: entry.urls.regular,
                    width: entry.width,
                    height: entry.height,
                    size: None,
                    extension,
                    meta: serde_json::Value::Null,
                }
            })
            .collect();

        Ok(RawInfo {
            source_url: format!("https://www.pixiv.net/artworks/{work_id}"),
            author_url: format!("https://www.pixiv.net/users/{}", illust.user_id),
            work_id,
            title: illust.title,
            author: illust.user_name,
            author_id: illust.user_id,
            explicit: illust.x_restrict >= 1,
            created_at,
            raw_tags,
            pages,
            meta: illust_value,
        })
    }
}
