//! Miyoushe/HoYoLAB adapter (nested-community-post style).
//!
//! One community, two deployments: the mainland site (miyoushe.com) and the
//! international one (hoyolab.com), with different API hosts and referers but
//! the same post shape. Posts are nested under per-game sections; the section
//! taxonomy feeds a game tag into both tag sets and the caption links.

use super::{
    derive_tags_default, AdapterContext, ArtworkParam, RawInfo, RawPage, SourceAdapter,
    TagDerivation,
};
use crate::error::{AdapterError, AdapterResult};
use artrelay_common::html_escape;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

/// Thumbnail derivation: the CDN resizes on the fly via this suffix
const X_OSS_PROCESS: &str =
    "?x-oss-process=image//resize,l_2560/quality,q_100/auto-orient,0/interlace,1/format,jpg";

pub struct Miyoushe;

fn article_regex() -> &'static Regex {
    static ARTICLE: OnceLock<Regex> = OnceLock::new();
    ARTICLE.get_or_init(|| {
        Regex::new(r"(?:miyoushe|hoyolab|bbs\.mihoyo)\.com/(?:[a-z0-9]+/)?article/(\d+)")
            .expect("article regex is valid")
    })
}

/// Per-game section taxonomy: game_id → (display name, URL path).
fn game_section(game_id: i64) -> AdapterResult<(&'static str, &'static str)> {
    match game_id {
        1 => Ok(("崩坏3", "bh3")),
        2 => Ok(("原神", "ys")),
        3 => Ok(("崩坏学园2", "bh2")),
        4 => Ok(("未定事件簿", "wd")),
        5 | 7 => Ok(("大别野", "dby")),
        6 => Ok(("星铁", "sr")),
        8 => Ok(("绝区零", "zzz")),
        other => Err(AdapterError::Parse(format!(
            "unknown community section {other}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct PostEnvelope {
    retcode: i64,
    #[serde(default)]
    message: String,
    data: Option<PostData>,
}

#[derive(Debug, Deserialize)]
struct PostData {
    post: PostWrap,
}

#[derive(Debug, Deserialize)]
struct PostWrap {
    post: PostBody,
    user: PostUser,
    #[serde(default)]
    image_list: Vec<PostImage>,
    #[serde(default)]
    topics: Vec<Topic>,
}

#[derive(Debug, Deserialize)]
struct PostBody {
    post_id: String,
    subject: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    game_id: i64,
    #[serde(default)]
    created_at: i64,
}

#[derive(Debug, Deserialize)]
struct PostUser {
    nickname: String,
    /// Arrives as string or number depending on deployment
    uid: Value,
}

#[derive(Debug, Deserialize)]
struct PostImage {
    url: String,
    #[serde(default)]
    width: Option<i64>,
    #[serde(default)]
    height: Option<i64>,
    /// Arrives as string or number depending on deployment
    #[serde(default)]
    size: Value,
    #[serde(default)]
    format: String,
}

#[derive(Debug, Deserialize)]
struct Topic {
    name: String,
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn normalize_extension(format: &str) -> String {
    match format {
        "JPEG" => "jpg".to_string(),
        "PNG" => "png".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

impl Miyoushe {
    fn is_global(url: &str) -> bool {
        url.contains("hoyolab")
    }
}

#[async_trait]
impl SourceAdapter for Miyoushe {
    fn platform(&self) -> &'static str {
        "miyoushe"
    }

    fn display_name(&self) -> &'static str {
        "米游社"
    }

    fn download_referer(&self) -> Option<&'static str> {
        Some("https://www.miyoushe.com/")
    }

    fn work_id_from_url(&self, url: &str) -> Option<String> {
        article_regex()
            .captures(url)
            .map(|captures| captures[1].to_string())
    }

    async fn extract(&self, ctx: &AdapterContext, url: &str) -> AdapterResult<RawInfo> {
        let post_id = self
            .work_id_from_url(url)
            .ok_or_else(|| AdapterError::Parse(format!("no article id in {url:?}")))?;
        let is_global = Self::is_global(url);

        let (api_url, referer) = if is_global {
            (
                format!(
                    "https://bbs-api-os.hoyolab.com/community/post/wapi/getPostFull?post_id={post_id}"
                ),
                "https://www.hoyolab.com/",
            )
        } else {
            (
                format!("https://bbs-api.miyoushe.com/post/wapi/getPostFull?post_id={post_id}"),
                "https://www.miyoushe.com/",
            )
        };

        let response = ctx
            .http
            .get(&api_url)
            .header(header::REFERER, referer)
            .header("X-Rpc-Language", "zh-cn")
            .send()
            .await?
            .error_for_status()?;

        let envelope: PostEnvelope = response
            .json()
            .await
            .map_err(|e| AdapterError::Parse(format!("community post response: {e}")))?;
        if envelope.retcode != 0 {
            return Err(AdapterError::Parse(format!(
                "community post error {}: {}",
                envelope.retcode, envelope.message
            )));
        }
        let wrap = envelope
            .data
            .ok_or_else(|| AdapterError::Parse("community post without data".to_string()))?
            .post;
        if wrap.image_list.is_empty() {
            return Err(AdapterError::Parse(format!(
                "community post {post_id} has no images"
            )));
        }

        let (source_url, author_url, game_name) = if is_global {
            (
                format!("https://www.hoyolab.com/article/{post_id}"),
                format!(
                    "https://www.hoyolab.com/accountCenter?id={}",
                    coerce_string(&wrap.user.uid)
                ),
                None,
            )
        } else {
            let (game_name, url_path) = game_section(wrap.post.game_id)?;
            (
                format!("https://www.miyoushe.com/{url_path}/article/{post_id}"),
                format!(
                    "https://www.miyoushe.com/{url_path}/accountCenter/postList?id={}",
                    coerce_string(&wrap.user.uid)
                ),
                Some(game_name),
            )
        };

        let pages = wrap
            .image_list
            .iter()
            .map(|image| {
                let extension = normalize_extension(&image.format);
                RawPage {
                    url_original: image.url.clone(),
                    url_thumb: format!("{}{X_OSS_PROCESS}", image.url),
                    width: image.width,
                    height: image.height,
                    size: coerce_i64(&image.size),
                    extension,
                    meta: Value::Null,
                }
            })
            .collect();

        let mut raw_tags: Vec<String> = wrap.topics.iter().map(|topic| topic.name.clone()).collect();
        if let Some(game) = game_name {
            raw_tags.push(game.to_string());
        }

        let body_text = if is_global && !wrap.post.desc.is_empty() {
            wrap.post.desc.clone()
        } else {
            wrap.post.content.clone()
        };
        let meta = serde_json::json!({
            "post_id": wrap.post.post_id,
            "game_name": game_name,
            "is_global": is_global,
            "body": body_text,
        });

        Ok(RawInfo {
            work_id: post_id,
            title: wrap.post.subject,
            author: wrap.user.nickname,
            author_id: coerce_string(&wrap.user.uid),
            source_url,
            author_url,
            explicit: false,
            created_at: DateTime::<Utc>::from_timestamp(wrap.post.created_at, 0),
            raw_tags,
            pages,
            meta,
        })
    }

    fn derive_tags(&self, raw: &RawInfo, param: &ArtworkParam) -> TagDerivation {
        let mut derivation = derive_tags_default(raw, param);
        // The game section tag is curated by construction
        if let Some(game) = raw.meta.get("game_name").and_then(Value::as_str) {
            let tag = format!("#{}", html_escape(game));
            if !derivation.curated.contains(&tag) {
                derivation.curated.push(tag);
                derivation.curated.sort();
            }
        }
        derivation
    }

    fn build_caption(&self, raw: &RawInfo, tags: &TagDerivation, param: &ArtworkParam) -> String {
        let is_global = raw
            .meta
            .get("is_global")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let community = if is_global { "HoYoLab" } else { "米游社" };
        let body = raw
            .meta
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let mut caption = format!(
            "<b>{}</b>\n<a href=\"{}\">Source</a> by <a href=\"{}\">{community} @{}</a>\n",
            html_escape(&raw.title),
            raw.source_url,
            raw.author_url,
            html_escape(&raw.author),
        );
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

        caption.push_str("<blockquote expandable>");
        if !body.is_empty() {
            caption.push_str(&html_escape(body));
            caption.push('\n');
        }
        caption.push_str(&format!("Topics: {}", tags.raw.join(" ")));
        if let Some(created_at) = raw.created_at {
            caption.push('\n');
            caption.push_str(&created_at.format("%Y-%m-%d %H:%M:%S").to_string());
        }
        caption.push_str("</blockquote>\n");

        caption
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_id_from_both_deployments() {
        for url in [
            "https://miyoushe.com/ys/article/54064752",
            "https://www.miyoushe.com/sr/article/54064752",
            "https://bbs.mihoyo.com/ys/article/54064752",
            "https://hoyolab.com/article/54064752",
            "https://www.hoyolab.com/article/54064752",
        ] {
            assert_eq!(
                Miyoushe.work_id_from_url(url),
                Some("54064752".to_string()),
                "failed for {url}"
            );
        }
        assert_eq!(Miyoushe.work_id_from_url("https://www.miyoushe.com/ys/"), None);
    }

    #[test]
    fn game_taxonomy_is_closed() {
        assert_eq!(game_section(2).unwrap(), ("原神", "ys"));
        assert_eq!(game_section(6).unwrap(), ("星铁", "sr"));
        assert_eq!(game_section(5).unwrap().1, "dby");
        assert_eq!(game_section(7).unwrap().1, "dby");
        assert!(game_section(99).is_err());
    }

    #[test]
    fn extension_normalization() {
        assert_eq!(normalize_extension("JPEG"), "jpg");
        assert_eq!(normalize_extension("PNG"), "png");
        assert_eq!(normalize_extension("gif"), "gif");
    }

    #[test]
    fn game_tag_lands_in_both_sets() {
        let raw = RawInfo {
            work_id: "54064752".to_string(),
            title: "t".to_string(),
            raw_tags: vec!["手绘".to_string(), "原神".to_string()],
            meta: serde_json::json!({ "game_name": "原神", "is_global": false, "body": "" }),
            ..RawInfo::default()
        };
        let tags = Miyoushe.derive_tags(&raw, &ArtworkParam::default());
        assert!(tags.curated.contains(&"#原神".to_string()));
        assert!(tags.raw.contains(&"#原神".to_string()));
    }

    #[test]
    fn caption_uses_community_name_and_body() {
        let raw = RawInfo {
            work_id: "1".to_string(),
            title: "post".to_string(),
            author: "画师".to_string(),
            source_url: "https://www.miyoushe.com/ys/article/1".to_string(),
            author_url: "https://www.miyoushe.com/ys/accountCenter/postList?id=9".to_string(),
            raw_tags: vec!["原神".to_string()],
            meta: serde_json::json!({ "game_name": "原神", "is_global": false, "body": "说明 <3" }),
            ..RawInfo::default()
        };
        let tags = Miyoushe.derive_tags(&raw, &ArtworkParam::default());
        let caption = Miyoushe.build_caption(&raw, &tags, &ArtworkParam::default());
        assert!(caption.contains("米游社 @画师"));
        assert!(caption.contains("说明 &lt;3"));
        assert!(caption.contains("Topics: #原神"));
    }
}
