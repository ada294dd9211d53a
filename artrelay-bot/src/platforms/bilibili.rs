//! Bilibili adapter (dynamic-feed style).
//!
//! Reads the polymer web-dynamic detail API. Only image posts
//! (`DYNAMIC_TYPE_DRAW`) are accepted; the post text stands in for a title
//! and the reported per-image size arrives in KiB.

use super::{AdapterContext, RawInfo, RawPage, SourceAdapter};
use crate::error::{AdapterError, AdapterResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header;
use serde::Deserialize;

const BILIBILI_REFERER: &str = "https://t.bilibili.com/";
const DYNAMIC_TYPE_DRAW: &str = "DYNAMIC_TYPE_DRAW";

pub struct Bilibili;

#[derive(Debug, Deserialize)]
struct DetailEnvelope {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<DetailData>,
}

#[derive(Debug, Deserialize)]
struct DetailData {
    item: DetailItem,
}

#[derive(Debug, Deserialize)]
struct DetailItem {
    #[serde(rename = "type")]
    kind: String,
    modules: Modules,
}

#[derive(Debug, Deserialize)]
struct Modules {
    module_author: ModuleAuthor,
    module_dynamic: ModuleDynamic,
}

#[derive(Debug, Deserialize)]
struct ModuleAuthor {
    name: String,
    mid: i64,
    #[serde(default)]
    pub_ts: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ModuleDynamic {
    major: Major,
}

#[derive(Debug, Deserialize)]
struct Major {
    opus: Opus,
}

#[derive(Debug, Deserialize)]
struct Opus {
    #[serde(default)]
    pics: Vec<Pic>,
    summary: Summary,
}

#[derive(Debug, Deserialize)]
struct Pic {
    url: String,
    #[serde(default)]
    width: Option<i64>,
    #[serde(default)]
    height: Option<i64>,
    /// KiB, sometimes fractional
    #[serde(default)]
    size: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Summary {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl SourceAdapter for Bilibili {
    fn platform(&self) -> &'static str {
        "bilibili"
    }

    fn display_name(&self) -> &'static str {
        "bilibili"
    }

    fn download_referer(&self) -> Option<&'static str> {
        Some(BILIBILI_REFERER)
    }

    fn work_id_from_url(&self, url: &str) -> Option<String> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let segment = path.trim_end_matches('/').rsplit('/').next()?;
        (!segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()))
            .then(|| segment.to_string())
    }

    async fn extract(&self, ctx: &AdapterContext, url: &str) -> AdapterResult<RawInfo> {
        let work_id = self
            .work_id_from_url(url)
            .ok_or_else(|| AdapterError::Parse(format!("no dynamic id in {url:?}")))?;

        let api_url = format!(
            "https://api.bilibili.com/x/polymer/web-dynamic/v1/detail\
             ?timezone_offset=-480&platform=web&id={work_id}&features=itemOpusStyle"
        );
        let response = ctx
            .http
            .get(&api_url)
            .header(header::REFERER, BILIBILI_REFERER)
            .send()
            .await?
            .error_for_status()?;

        let envelope: DetailEnvelope = response
            .json()
            .await
            .map_err(|e| AdapterError::Parse(format!("bilibili detail response: {e}")))?;
        if envelope.code != 0 {
            return Err(AdapterError::Parse(format!(
                "bilibili detail error {}: {}",
                envelope.code, envelope.message
            )));
        }
        let item = envelope
            .data
            .ok_or_else(|| AdapterError::Parse("bilibili detail without data".to_string()))?
            .item;
        if item.kind != DYNAMIC_TYPE_DRAW {
            return Err(AdapterError::Parse(format!(
                "unsupported dynamic type {}",
                item.kind
            )));
        }

        let author = item.modules.module_author;
        let opus = item.modules.module_dynamic.major.opus;
        if opus.pics.is_empty() {
            return Err(AdapterError::Parse(format!(
                "bilibili post {work_id} has no images"
            )));
        }

        let pages = opus
            .pics
            .iter()
            .map(|pic| RawPage {
                url_original: pic.url.clone(),
                url_thumb: pic.url.clone(),
                width: pic.width,
                height: pic.height,
                size: pic.size.map(|kib| (kib * 1024.0) as i64),
                extension: super::extension_from_url(&pic.url),
                meta: serde_json::Value::Null,
            })
            .collect();

        Ok(RawInfo {
            source_url: format!("https://www.bilibili.com/opus/{work_id}"),
            author_url: format!("https://space.bilibili.com/{}", author.mid),
            work_id,
            title: opus.summary.text,
            author: author.name,
            author_id: author.mid.to_string(),
            explicit: false,
            created_at: author.pub_ts.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
            raw_tags: Vec::new(),
            pages,
            meta: serde_json::Value::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_id_from_opus_urls() {
        assert_eq!(
            Bilibili.work_id_from_url("https://www.bilibili.com/opus/912345678901234567"),
            Some("912345678901234567".to_string())
        );
        assert_eq!(
            Bilibili.work_id_from_url("https://t.bilibili.com/912345678901234567?spm=1"),
            Some("912345678901234567".to_string())
        );
        assert_eq!(Bilibili.work_id_from_url("https://www.bilibili.com/opus/"), None);
    }

    #[test]
    fn detail_envelope_deserializes_and_scales_size() {
        let envelope: DetailEnvelope = serde_json::from_value(serde_json::json!({
            "code": 0,
            "data": { "item": {
                "type": "DYNAMIC_TYPE_DRAW",
                "modules": {
                    "module_author": { "name": "painter", "mid": 12, "pub_ts": 1700000000 },
                    "module_dynamic": { "major": { "opus": {
                        "pics": [ { "url": "https://i0.hdslb.com/a.png", "width": 100,
                                    "height": 50, "size": 1.5 } ],
                        "summary": { "text": "today's sketch" }
                    } } }
                }
            } }
        }))
        .unwrap();
        let item = envelope.data.unwrap().item;
        assert_eq!(item.kind, DYNAMIC_TYPE_DRAW);
        let pic = &item.modules.module_dynamic.major.opus.pics[0];
        assert_eq!(pic.size.map(|kib| (kib * 1024.0) as i64), Some(1536));
    }
}
