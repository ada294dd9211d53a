//! Original-file retrieval.
//!
//! Two triggers re-serve the unmodified originals of a published artwork:
//! a channel post forwarded into the discussion group (matched against the
//! back-reference cache, single-use), and a manual replay command replying
//! to a published message. Both send grouped documents with no caption,
//! using the same chunking and pacing rules as the publisher.

use crate::backrefs::BackrefCache;
use crate::db::artworks;
use crate::models::ArtworkRecord;
use crate::platforms::local_path;
use crate::publisher::MAX_BATCH;
use crate::telegram::{InputMedia, MediaKind, MediaTransport, TgMessage};
use artrelay_common::Config;
use sqlx::SqlitePool;
use std::time::Duration;

/// Pacing between document chunks, per item in the chunk just sent
pub const PACING_PER_ITEM: Duration = Duration::from_secs(3);

/// Send the originals for `records` as grouped documents, updating the
/// records' remote document handles in place.
pub async fn send_original_batches(
    transport: &dyn MediaTransport,
    config: &Config,
    chat: &str,
    reply_to: Option<i64>,
    records: &mut [ArtworkRecord],
    pacing_per_item: Duration,
) -> artrelay_common::Result<()> {
    let total = records.len().div_ceil(MAX_BATCH);
    for chunk_index in 0..total {
        let start = chunk_index * MAX_BATCH;
        let end = (start + MAX_BATCH).min(records.len());

        let items: Vec<InputMedia> = records[start..end]
            .iter()
            .map(|record| match &record.tg_file_original {
                Some(file_id) => InputMedia::file_id(file_id.clone()),
                None => InputMedia::upload(local_path(config, record)),
            })
            .collect();

        let messages = transport
            .send_media_group(chat, MediaKind::Document, &items, true, reply_to)
            .await?;

        for (offset, message) in messages.iter().enumerate() {
            if let Some(record) = records.get_mut(start + offset) {
                if let Some(document) = &message.document {
                    record.tg_file_original = Some(document.file_id.clone());
                }
            }
        }

        if chunk_index + 1 < total {
            tokio::time::sleep(pacing_per_item * (end - start) as u32).await;
        }
    }

    Ok(())
}

/// Automatic path: a forward event referencing a published message. A miss
/// is ignored silently; a hit consumes the back-reference (a second forward
/// of the same message does nothing). Returns whether the event was handled.
pub async fn handle_forward_event(
    transport: &dyn MediaTransport,
    config: &Config,
    pool: &SqlitePool,
    backrefs: &BackrefCache,
    message: &TgMessage,
) -> anyhow::Result<bool> {
    let Some(forwarded_id) = message.forwarded_from_message_id() else {
        return Ok(false);
    };
    let Some(mut records) = backrefs.take(forwarded_id).await else {
        return Ok(false);
    };

    tracing::info!(
        forwarded_id,
        pages = records.len(),
        "re-serving originals for forwarded channel post"
    );
    send_original_batches(
        transport,
        config,
        &message.chat.id.to_string(),
        Some(message.message_id),
        &mut records,
        PACING_PER_ITEM,
    )
    .await?;

    let mut conn = pool.acquire().await?;
    artworks::update_remote_handles(conn.as_mut(), &records).await?;

    Ok(true)
}

/// Manual path: replay the originals for the work id carried in `url` into
/// the thread of `replied`. Returns the number of pages replayed; zero means
/// no canonical records exist for the id.
pub async fn replay_for_url(
    transport: &dyn MediaTransport,
    config: &Config,
    pool: &SqlitePool,
    replied: &TgMessage,
    url: &str,
) -> anyhow::Result<usize> {
    let work_id = work_id_from_url_tail(url);

    let mut conn = pool.acquire().await?;
    let mut records = artworks::find_canonical_pages(conn.as_mut(), &work_id).await?;
    if records.is_empty() {
        return Ok(0);
    }

    send_original_batches(
        transport,
        config,
        &replied.chat.id.to_string(),
        Some(replied.message_id),
        &mut records,
        PACING_PER_ITEM,
    )
    .await?;
    artworks::update_remote_handles(conn.as_mut(), &records).await?;

    Ok(records.len())
}

/// Work id as the last path segment of a URL, query and fragment stripped.
pub fn work_id_from_url_tail(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}
