//! Publisher: turns one `ArtworkResult` into grouped-media sends.
//!
//! Routing override, ≤10-item batching with `(i/total)` caption prefixes,
//! per-item media selection (cached file_id → local file → compressed
//! substitute), notification throttling, back-reference bookkeeping and
//! fixed pacing between chunks. A failure mid-sequence is not compensated:
//! chunks already sent stay live.

use crate::backrefs::BackrefCache;
use crate::compress;
use crate::models::{ArtworkRecord, ArtworkResult, MessageRef};
use crate::platforms::local_path;
use crate::telegram::{InputMedia, MediaKind, MediaTransport};
use artrelay_common::{Config, Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// A grouped-media message holds at most this many items
pub const MAX_BATCH: usize = 10;

/// Pacing between chunks, per item in the chunk just sent
const PACING_PER_ITEM: Duration = Duration::from_secs(3);

/// Number of batches for a page count.
pub fn batch_count(pages: usize) -> usize {
    pages.div_ceil(MAX_BATCH)
}

/// Caption for chunk `index` of `total`: prefixed with `(i/total)` when the
/// artwork spans more than one batch.
pub fn chunk_caption(index: usize, total: usize, caption: &str) -> String {
    if total > 1 {
        format!("({}/{total})\n{caption}", index + 1)
    } else {
        caption.to_string()
    }
}

pub struct Publisher {
    transport: Arc<dyn MediaTransport>,
    config: Arc<Config>,
    backrefs: Arc<BackrefCache>,
    /// Last primary-channel publish, for notification throttling
    last_channel_post: Mutex<Option<Instant>>,
    pacing_per_item: Duration,
}

impl Publisher {
    pub fn new(
        transport: Arc<dyn MediaTransport>,
        config: Arc<Config>,
        backrefs: Arc<BackrefCache>,
    ) -> Self {
        Self {
            transport,
            config,
            backrefs,
            last_channel_post: Mutex::new(None),
            pacing_per_item: PACING_PER_ITEM,
        }
    }

    /// Override the inter-chunk pacing (tests).
    pub fn with_pacing(mut self, pacing_per_item: Duration) -> Self {
        self.pacing_per_item = pacing_per_item;
        self
    }

    fn is_channel(&self, chat: &str) -> bool {
        chat == self.config.channel
            || self.config.ai_redirect_channel.as_deref() == Some(chat)
    }

    /// Publish the result's records to `destination` as one or more
    /// grouped-photo messages. Mutates the records in place with the
    /// returned remote handles; the caller persists them and commits.
    pub async fn publish(&self, result: &mut ArtworkResult, destination: &str) -> Result<()> {
        if result.records.is_empty() {
            return Err(Error::InvalidInput("nothing to publish".to_string()));
        }

        // Routing override: AI-flagged artworks leave the primary channel
        let mut chat = destination.to_string();
        if self.config.ai_redirect && result.is_aigc && chat == self.config.channel {
            if let Some(redirect) = &self.config.ai_redirect_channel {
                tracing::info!(from = %chat, to = %redirect, "AI redirect");
                chat = redirect.clone();
            }
        }
        let channel_send = self.is_channel(&chat);

        // Notification throttling applies to channel sends only
        let mut disable_notification = false;
        if channel_send {
            let cooldown = Duration::from_secs(self.config.notification_cooldown_secs);
            let mut last = self.last_channel_post.lock().await;
            disable_notification = last.is_some_and(|at| at.elapsed() < cooldown);
            *last = Some(Instant::now());
        }
        if let Some(silent) = result.param.silent {
            disable_notification = silent;
        }

        let total = batch_count(result.records.len());
        for chunk_index in 0..total {
            let start = chunk_index * MAX_BATCH;
            let end = (start + MAX_BATCH).min(result.records.len());

            let mut items = Vec::with_capacity(end - start);
            for record in &result.records[start..end] {
                items.push(self.preview_media(record, result.param.spoiler)?);
            }
            if let Some(first) = items.first_mut() {
                first.caption = Some(chunk_caption(chunk_index, total, &result.caption));
            }

            let messages = self
                .transport
                .send_media_group(&chat, MediaKind::Photo, &items, disable_notification, None)
                .await?;

            for (offset, message) in messages.iter().enumerate() {
                if let Some(record) = result.records.get_mut(start + offset) {
                    if let Some(file_id) = message.largest_photo_file_id() {
                        record.tg_file_thumb = Some(file_id.to_string());
                    }
                }
            }

            if let Some(first) = messages.first() {
                if result.published_msg.is_none() {
                    result.published_msg = Some(MessageRef {
                        chat_id: first.chat.id,
                        message_id: first.message_id,
                        link: first.link(),
                    });
                }
                if channel_send {
                    self.backrefs
                        .insert(first.message_id, result.records[start..end].to_vec())
                        .await;
                }
            }

            // Fixed pacing keeps the destination's rate limiter quiet
            if chunk_index + 1 < total {
                tokio::time::sleep(self.pacing_per_item * (end - start) as u32).await;
            }
        }

        result.feedback.push_str("\nPublished successfully.");
        Ok(())
    }

    /// Media selection for one preview item: cached remote handle first,
    /// then the local file, compressed when it exceeds the upload budget.
    fn preview_media(&self, record: &ArtworkRecord, spoiler: Option<bool>) -> Result<InputMedia> {
        let spoiler = spoiler.unwrap_or(record.explicit);

        if let Some(file_id) = &record.tg_file_thumb {
            let mut media = InputMedia::file_id(file_id.clone());
            media.spoiler = spoiler;
            return Ok(media);
        }

        let path = local_path(&self.config, record);
        let path = if compress::within_upload_limit(&path, record.width, record.height) {
            path
        } else {
            let substitute = self
                .config
                .download_dir
                .join(&record.platform)
                .join(format!("compressed_{}", record.file_name));
            compress::compress_image(&path, &substitute, compress::PHOTO_BYTE_LIMIT)
                .map_err(|e| Error::Internal(format!("compression failed: {e}")))?;
            substitute
        };

        let mut media = InputMedia::upload(path);
        media.spoiler = spoiler;
        Ok(media)
    }
}
