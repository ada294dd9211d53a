//! Generic adapter: the fallback for every unrecognized source.
//!
//! Extraction is delegated to the external `gallery-dl` subprocess in JSON
//! mode, which emits a normalized page list for several hundred sites. The
//! metadata shape still varies per site, so the canonical fields are resolved
//! through chains of field aliases.

use super::{AdapterContext, RawInfo, RawPage, SourceAdapter};
use crate::error::{AdapterError, AdapterResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tokio::process::Command;

/// Entry marker gallery-dl uses for downloadable files
const ENTRY_FILE: i64 = 3;

pub struct Generic;

#[async_trait]
impl SourceAdapter for Generic {
    fn platform(&self) -> &'static str {
        "generic"
    }

    fn work_id_from_url(&self, _url: &str) -> Option<String> {
        // No common id scheme; the id comes out of the extracted metadata
        None
    }

    async fn extract(&self, ctx: &AdapterContext, url: &str) -> AdapterResult<RawInfo> {
        extract_with_gallery_dl(ctx, url).await
    }
}

/// Run gallery-dl and normalize its JSON dump. Shared with the microblog
/// variant, which post-processes the result.
pub(crate) async fn extract_with_gallery_dl(
    ctx: &AdapterContext,
    url: &str,
) -> AdapterResult<RawInfo> {
    let output = Command::new(&ctx.config.gallery_dl_bin)
        .arg(url)
        .arg("-j")
        .arg("-q")
        .output()
        .await?;

    if !output.status.success() {
        return Err(AdapterError::Extraction(format!(
            "gallery-dl exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let dump: Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| AdapterError::Parse(format!("gallery-dl output: {e}")))?;
    normalize_dump(&dump, url)
}

/// Normalize a gallery-dl JSON dump: the first entry carries the gallery
/// metadata as its last element, file entries are `[3, url, info]`.
pub(crate) fn normalize_dump(dump: &Value, url: &str) -> AdapterResult<RawInfo> {
    let entries = dump
        .as_array()
        .ok_or_else(|| AdapterError::Parse("gallery-dl dump is not an array".to_string()))?;

    let meta = entries
        .first()
        .and_then(|entry| entry.as_array())
        .and_then(|entry| entry.last())
        .cloned()
        .unwrap_or(Value::Null);

    let mut pages = Vec::new();
    for entry in entries.iter().skip(1) {
        let Some(entry) = entry.as_array() else {
            continue;
        };
        if entry.first().and_then(Value::as_i64) != Some(ENTRY_FILE) {
            continue;
        }
        let Some(url_original) = entry.get(1).and_then(Value::as_str) else {
            continue;
        };
        let info = entry.get(2).cloned().unwrap_or(Value::Null);

        let extension = str_chain(&info, &["extension", "file_ext"])
            .or_else(|| str_chain(&meta, &["extension", "file_ext"]))
            .unwrap_or_else(|| super::extension_from_url(url_original));
        pages.push(RawPage {
            url_original: url_original.to_string(),
            url_thumb: str_chain(&info, &["jpeg_url", "sample_url"]).unwrap_or_default(),
            width: int_chain(&info, &["width", "image_width"]),
            height: int_chain(&info, &["height", "image_height"]),
            size: int_chain(&info, &["file_size", "filesize"]),
            extension,
            meta: info,
        });
    }

    if pages.is_empty() {
        return Err(AdapterError::Parse(format!("no downloadable pages in {url:?}")));
    }

    let work_id = str_chain(&meta, &["id", "media_id", "tweet_id"])
        .unwrap_or_else(|| pages[0].url_original.clone());
    let title = str_chain(&meta, &["title", "content", "tweet_content"])
        .unwrap_or_else(|| work_id.clone());
    let author = str_chain(&meta, &["author.name", "author", "artist", "uploader"])
        .unwrap_or_default();
    let author_id = str_chain(
        &meta,
        &[
            "pixiv_id",
            "uploader_id",
            "approver_id",
            "creator_id",
            "user.id",
            "author.id",
        ],
    )
    .unwrap_or_default();

    let mut raw_tags = Vec::new();
    for key in ["tags", "characters", "artist"] {
        raw_tags.extend(tag_list(&meta, key));
    }

    // Image boards report an explicit rating directly
    let explicit = matches!(
        str_chain(&meta, &["rating"]).as_deref(),
        Some("e") | Some("explicit")
    );

    let created_at = str_chain(&meta, &["date"]).and_then(|date| {
        NaiveDateTime::parse_from_str(&date, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
    });

    Ok(RawInfo {
        work_id,
        title,
        author,
        author_id,
        source_url: url.to_string(),
        author_url: String::new(),
        explicit,
        created_at,
        raw_tags,
        pages,
        meta,
    })
}

/// Resolve a dot-separated path inside a metadata object.
pub(crate) fn lookup<'a>(meta: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = meta;
    for key in path.split('.') {
        current = current.get(key)?;
    }
    Some(current)
}

/// First alias that resolves to a string (numbers are stringified).
pub(crate) fn str_chain(meta: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match lookup(meta, key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First alias that resolves to an integer (stringified numbers accepted).
pub(crate) fn int_chain(meta: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| match lookup(meta, key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    })
}

/// A tag field may be a list or one whitespace-joined string.
fn tag_list(meta: &Value, key: &str) -> Vec<String> {
    match lookup(meta, key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|tag| tag.to_string())
            .collect(),
        Some(Value::String(joined)) => joined.split_whitespace().map(|t| t.to_string()).collect(),
        _ => Vec::new(),
    }
}
