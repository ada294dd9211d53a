//! Twitter adapter (microblog style).
//!
//! Extraction rides on the generic gallery-dl subprocess; this variant only
//! normalizes the submission URL, recovers the tweet id, and fills the
//! caption links the generic metadata cannot provide. Tweets have no title,
//! so the post text stands in for one.

use super::{generic, AdapterContext, RawInfo, SourceAdapter};
use crate::error::AdapterResult;
use async_trait::async_trait;

pub struct Twitter;

/// Tweet id following a `/status/` path segment.
fn status_id(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let (_, rest) = path.split_once("/status/")?;
    let id: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    (!id.is_empty()).then_some(id)
}

#[async_trait]
impl SourceAdapter for Twitter {
    fn platform(&self) -> &'static str {
        "twitter"
    }

    fn display_name(&self) -> &'static str {
        "Twitter"
    }

    fn work_id_from_url(&self, url: &str) -> Option<String> {
        status_id(url)
    }

    async fn extract(&self, ctx: &AdapterContext, url: &str) -> AdapterResult<RawInfo> {
        // The extractor knows the canonical host
        let url = url.replace("x.com", "twitter.com");
        let mut raw = generic::extract_with_gallery_dl(ctx, &url).await?;

        if let Some(id) = status_id(&url) {
            raw.work_id = id;
        }
        if raw.author.is_empty() {
            raw.author = generic::str_chain(&raw.meta, &["user.name", "user.nick"])
                .unwrap_or_default();
        }
        if !raw.author.is_empty() {
            raw.author_url = format!("https://twitter.com/{}", raw.author);
        }
        raw.source_url = url;

        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_id_from_urls() {
        assert_eq!(
            status_id("https://twitter.com/artist/status/1712345678901234567"),
            Some("1712345678901234567".to_string())
        );
        assert_eq!(
            status_id("https://x.com/artist/status/17?s=20"),
            Some("17".to_string())
        );
        assert_eq!(
            status_id("https://twitter.com/artist/status/17/photo/1"),
            Some("17".to_string())
        );
        assert_eq!(status_id("https://twitter.com/artist"), None);
    }
}
