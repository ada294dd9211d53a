//! Shared fixtures for integration tests.
#![allow(dead_code)]

use artrelay_bot::telegram::{
    InputMedia, MediaKind, MediaTransport, TgChat, TgDocument, TgMessage, TgPhotoSize,
};
use artrelay_bot::models::ArtworkRecord;
use artrelay_common::Config;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;

/// One recorded send_media_group call.
pub struct SentBatch {
    pub chat: String,
    pub kind: MediaKind,
    pub items: Vec<InputMedia>,
    pub disable_notification: bool,
    pub reply_to: Option<i64>,
    pub message_ids: Vec<i64>,
}

/// Transport double: records every batch and answers with synthetic
/// messages carrying fresh file_ids.
#[derive(Default)]
pub struct RecordingTransport {
    pub calls: Mutex<Vec<SentBatch>>,
    counter: AtomicI64,
}

#[async_trait]
impl MediaTransport for RecordingTransport {
    async fn send_media_group(
        &self,
        chat: &str,
        kind: MediaKind,
        items: &[InputMedia],
        disable_notification: bool,
        reply_to: Option<i64>,
    ) -> artrelay_common::Result<Vec<TgMessage>> {
        let mut messages = Vec::with_capacity(items.len());
        let mut message_ids = Vec::with_capacity(items.len());
        for _ in items {
            let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            message_ids.push(id);
            messages.push(TgMessage {
                message_id: id,
                chat: TgChat {
                    id: -100,
                    username: Some("testchannel".to_string()),
                    kind: "channel".to_string(),
                },
                from: None,
                text: None,
                caption: None,
                photo: (kind == MediaKind::Photo).then(|| {
                    vec![TgPhotoSize {
                        file_id: format!("photo-{id}"),
                        width: 1280,
                        height: 720,
                    }]
                }),
                document: (kind == MediaKind::Document).then(|| TgDocument {
                    file_id: format!("doc-{id}"),
                }),
                reply_to_message: None,
                forward_from_message_id: None,
                forward_origin: None,
            });
        }

        self.calls.lock().await.push(SentBatch {
            chat: chat.to_string(),
            kind,
            items: items.to_vec(),
            disable_notification,
            reply_to,
            message_ids,
        });
        Ok(messages)
    }
}

/// Configuration rooted in a scratch directory.
pub fn test_config(dir: &Path) -> Config {
    Config::parse(&format!(
        r#"
        bot_token = "123:test"
        channel = "@testchannel"
        comment_group = -1001
        db_path = "{0}/artrelay.db"
        download_dir = "{0}/downloads"
        "#,
        dir.display()
    ))
    .unwrap()
}

/// One page record with a cached preview handle (no local file needed).
pub fn record(work_id: &str, page: i64) -> ArtworkRecord {
    let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    ArtworkRecord {
        platform: "pixiv".to_string(),
        work_id: work_id.to_string(),
        page,
        user_id: 7,
        user_name: "curator".to_string(),
        title: "Hina <3".to_string(),
        author: "someone".to_string(),
        author_id: "42".to_string(),
        url_original: format!("https://i.pximg.net/img-original/{work_id}_p{page}.png"),
        url_thumb: format!("https://i.pximg.net/img-master/{work_id}_p{page}.jpg"),
        file_name: format!("{work_id}_{page}.png"),
        extension: "png".to_string(),
        size: Some(1000),
        width: Some(1200),
        height: Some(800),
        explicit: false,
        ai_generated: false,
        guest: false,
        raw_meta: "{}".to_string(),
        tg_file_thumb: Some(format!("cached-thumb-{work_id}-{page}")),
        tg_file_original: None,
        created_at: at,
        updated_at: at,
        post_count: 1,
    }
}
