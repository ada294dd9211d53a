//! Aggregator/orchestrator: one submission in, one `ArtworkResult` out.
//!
//! Fixed sequence: classify → resolve work id → duplicate-check → cache-check
//! → build records → derive tags → concurrent page downloads → caption.
//! Adapter-level failures never escape: they collapse into one generic
//! failure result. Persistence failures propagate to the command handler.
//!
//! Writes are staged on the connection the caller passes in (normally a
//! transaction) and committed by the caller only after the publish settles,
//! so a failed canonical publish leaves no canonical artifact.

use crate::db::{artworks, tags};
use crate::error::AdapterError;
use crate::models::{ArtworkParam, ArtworkRecord, ArtworkResult, Contributor};
use crate::platforms::{fetch_content, AdapterContext, RawInfo, RawPage, SourceKind};
use chrono::Utc;
use futures::future::join_all;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Fixed user-facing text for any extraction-level failure
pub const GENERIC_FAILURE_TEXT: &str =
    "Could not retrieve the artwork. The source may be unreachable, or the link malformed.";

/// Per-(platform, work id) advisory locks serializing the
/// dedup-check/cache-check/insert window for concurrent submissions of the
/// same work. The UNIQUE index on the store is the persistent backstop.
#[derive(Default)]
pub struct WorkLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WorkLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, platform: &str, work_id: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().await;
            map.entry(format!("{platform}:{work_id}"))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }
}

enum PipelineFailure {
    /// Recovered into a failure result
    Adapter(AdapterError),
    /// Propagated raw (persistence layer)
    Fatal(anyhow::Error),
}

impl From<AdapterError> for PipelineFailure {
    fn from(e: AdapterError) -> Self {
        PipelineFailure::Adapter(e)
    }
}

fn fatal(e: anyhow::Error) -> PipelineFailure {
    PipelineFailure::Fatal(e)
}

/// Run the whole pipeline for one submission.
pub async fn run_pipeline(
    ctx: &AdapterContext,
    conn: &mut SqliteConnection,
    locks: &WorkLocks,
    url: &str,
    param: ArtworkParam,
    contributor: &Contributor,
    canonical: bool,
) -> anyhow::Result<ArtworkResult> {
    match run_inner(ctx, conn, locks, url, param.clone(), contributor, canonical).await {
        Ok(result) => Ok(result),
        Err(PipelineFailure::Adapter(e)) => {
            tracing::warn!(url, error = %e, "extraction failed");
            let mut result = ArtworkResult::failure(GENERIC_FAILURE_TEXT);
            result.param = param;
            Ok(result)
        }
        Err(PipelineFailure::Fatal(e)) => Err(e),
    }
}

async fn run_inner(
    ctx: &AdapterContext,
    conn: &mut SqliteConnection,
    locks: &WorkLocks,
    url: &str,
    param: ArtworkParam,
    contributor: &Contributor,
    canonical: bool,
) -> Result<ArtworkResult, PipelineFailure> {
    let kind = SourceKind::classify(url);
    let adapter = kind.adapter();
    let platform = adapter.platform();
    let now = Utc::now();

    tracing::info!(url, ?kind, canonical, "pipeline start");

    // When the URL carries the work id, dedup/cache run before any network
    // round trip; otherwise one extraction resolves the id first.
    let mut raw: Option<RawInfo> = None;
    let work_id = match adapter.work_id_from_url(url) {
        Some(id) => id,
        None => {
            let extracted = adapter.extract(ctx, url).await?;
            let id = extracted.work_id.clone();
            raw = Some(extracted);
            id
        }
    };

    let _guard = locks.acquire(platform, &work_id).await;

    // Duplicate check: canonical mode with dedup enabled only, and only
    // against non-guest rows
    if canonical && ctx.config.deduplication {
        if let Some(existing) = artworks::find_duplicate(conn, platform, &work_id)
            .await
            .map_err(fatal)?
        {
            tracing::warn!(platform, %work_id, "duplicate submission rejected");
            let original = Contributor::new(existing.user_id, existing.user_name.clone());
            let mut result = ArtworkResult::failure(format!(
                "This artwork was already posted by {} on {}.",
                original.mention_html(),
                existing.created_at.format("%Y-%m-%d %H:%M:%S"),
            ));
            result.param = param;
            return Ok(result);
        }
    }

    // Cache check: unconditional, guest rows included
    let cached = artworks::find_cached(conn, platform, &work_id)
        .await
        .map_err(fatal)?;
    if !cached.is_empty() {
        tracing::info!(platform, %work_id, pages = cached.len(), "cache hit");
        artworks::touch_reposted(conn, platform, &work_id, contributor, canonical, now)
            .await
            .map_err(fatal)?;

        let mut records = cached;
        for record in &mut records {
            record.updated_at = now;
            record.post_count += 1;
            if canonical {
                record.guest = false;
                record.user_id = contributor.id;
                record.user_name = contributor.name.clone();
            } else if record.guest {
                record.user_id = contributor.id;
                record.user_name = contributor.name.clone();
            }
        }

        // Tags and caption are re-derived against this request's curated
        // tags; the cached page rows are reused verbatim
        let raw = match raw {
            Some(raw) => raw,
            None => raw_info_from_records(&records),
        };
        let derivation = adapter.derive_tags(&raw, &param);
        let caption = adapter.build_caption(&raw, &derivation, &param);
        let feedback = format!("Loaded {} cached page(s).\n", records.len());

        return Ok(ArtworkResult {
            success: true,
            feedback,
            caption,
            records,
            tags: derivation.curated,
            raw_tags: derivation.raw,
            is_nsfw: derivation.is_nsfw,
            is_aigc: derivation.is_aigc,
            cached: true,
            param,
            ..ArtworkResult::default()
        });
    }

    // Fresh build
    let raw = match raw {
        Some(raw) => raw,
        None => adapter.extract(ctx, url).await?,
    };
    let derivation = adapter.derive_tags(&raw, &param);
    let mut records = adapter.build_records(&raw, contributor, canonical, &param, now);
    if records.is_empty() {
        return Err(AdapterError::Parse(format!("no pages selected for {url:?}")).into());
    }
    for record in &mut records {
        record.explicit = derivation.is_nsfw;
        record.ai_generated = derivation.is_aigc;
    }

    // Fan out all page downloads and join; per-page failures were already
    // swallowed and logged by the download helper
    let referer = adapter.download_referer();
    let measured = join_all(
        records
            .iter()
            .map(|record| fetch_content(ctx, record, referer)),
    )
    .await;
    for (record, size) in records.iter_mut().zip(measured) {
        if record.size.is_none() {
            record.size = size;
        }
    }

    // Stage rows for the caller's commit
    for record in &records {
        artworks::insert(conn, record).await.map_err(fatal)?;
    }
    tags::append(conn, &work_id, &derivation.curated)
        .await
        .map_err(fatal)?;

    let caption = adapter.build_caption(&raw, &derivation, &param);
    let mut feedback = format!("Fetched successfully!\n{} page(s)\n", records.len());
    for record in &records {
        if let (Some(width), Some(height)) = (record.width, record.height) {
            feedback.push_str(&format!("Page {}: {width}x{height}\n", record.page));
        }
    }

    Ok(ArtworkResult {
        success: true,
        feedback,
        caption,
        records,
        tags: derivation.curated,
        raw_tags: derivation.raw,
        is_nsfw: derivation.is_nsfw,
        is_aigc: derivation.is_aigc,
        cached: false,
        param,
        ..ArtworkResult::default()
    })
}

/// Rebuild the extraction product for a cache hit. Page 1 carries the full
/// serialized `RawInfo`; a blob from an older schema degrades to the record
/// columns (the caption then omits what cannot be recovered).
fn raw_info_from_records(records: &[ArtworkRecord]) -> RawInfo {
    let Some(first) = records.first() else {
        return RawInfo::default();
    };

    if let Ok(raw) = serde_json::from_str::<RawInfo>(&first.raw_meta) {
        if !raw.work_id.is_empty() && !raw.pages.is_empty() {
            return raw;
        }
    }

    RawInfo {
        work_id: first.work_id.clone(),
        title: first.title.clone(),
        author: first.author.clone(),
        author_id: first.author_id.clone(),
        source_url: String::new(),
        author_url: String::new(),
        explicit: first.explicit,
        created_at: Some(first.created_at),
        raw_tags: Vec::new(),
        pages: records
            .iter()
            .map(|record| RawPage {
                url_original: record.url_original.clone(),
                url_thumb: record.url_thumb.clone(),
                width: record.width,
                height: record.height,
                size: record.size,
                extension: record.extension.clone(),
                meta: serde_json::Value::Null,
            })
            .collect(),
        meta: serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn work_locks_serialize_same_key() {
        let locks = Arc::new(WorkLocks::new());
        let guard = locks.acquire("pixiv", "1").await;

        let contended = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("pixiv", "1").await;
            })
        };
        // The second acquire cannot finish while the guard is held
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contended.is_finished());

        drop(guard);
        contended.await.unwrap();
    }

    #[tokio::test]
    async fn work_locks_do_not_block_other_keys() {
        let locks = WorkLocks::new();
        let _one = locks.acquire("pixiv", "1").await;
        // Different work id: acquires immediately
        let _two = locks.acquire("pixiv", "2").await;
        let _three = locks.acquire("twitter", "1").await;
    }

    #[test]
    fn degraded_blob_falls_back_to_record_columns() {
        use chrono::Utc;
        let record = ArtworkRecord {
            platform: "pixiv".to_string(),
            work_id: "77".to_string(),
            page: 1,
            user_id: 1,
            user_name: "u".to_string(),
            title: "t".to_string(),
            author: "a".to_string(),
            author_id: "9".to_string(),
            url_original: "https://host/a.png".to_string(),
            url_thumb: "https://host/a_t.png".to_string(),
            file_name: "77_1.png".to_string(),
            extension: "png".to_string(),
            size: Some(10),
            width: Some(2),
            height: Some(3),
            explicit: true,
            ai_generated: false,
            guest: false,
            raw_meta: "not json".to_string(),
            tg_file_thumb: None,
            tg_file_original: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            post_count: 1,
        };
        let raw = raw_info_from_records(&[record]);
        assert_eq!(raw.work_id, "77");
        assert_eq!(raw.pages.len(), 1);
        assert!(raw.explicit);
    }
}
