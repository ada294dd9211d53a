//! Minimal Telegram Bot API client.
//!
//! Thin I/O surface: long polling in, HTML messages and grouped media out.
//! Media groups upload local files via `attach://` multipart parts and reuse
//! file_ids the destination already knows. API-level failures surface as
//! `Error::Telegram` with the server's description.

pub mod types;

pub use types::*;

use artrelay_common::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

const API_BASE: &str = "https://api.telegram.org";

/// Covers media-group uploads; plain API calls finish far sooner
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Long-poll window for getUpdates
pub const POLL_TIMEOUT_SECS: u64 = 50;

/// The outbound media seam. The publisher and the originals path depend on
/// this rather than on the concrete client, so tests can record sends.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    async fn send_media_group(
        &self,
        chat: &str,
        kind: MediaKind,
        items: &[InputMedia],
        disable_notification: bool,
        reply_to: Option<i64>,
    ) -> Result<Vec<TgMessage>>;
}

pub struct BotClient {
    http: reqwest::Client,
    base: String,
}

#[derive(Debug, serde::Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

impl BotClient {
    pub fn new(token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base: format!("{API_BASE}/bot{token}"),
        })
    }

    /// Numeric chat ids go out as numbers, `@channel` names as strings.
    fn chat_param(chat: &str) -> serde_json::Value {
        match chat.parse::<i64>() {
            Ok(id) => json!(id),
            Err(_) => json!(chat),
        }
    }

    async fn unwrap_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        // The API reports failures as HTTP errors with a JSON body; read the
        // description instead of the bare status
        let api: ApiResponse<T> = response.json().await?;
        if api.ok {
            api.result
                .ok_or_else(|| Error::Telegram("response without result".to_string()))
        } else {
            Err(Error::Telegram(
                api.description.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, payload: serde_json::Value) -> Result<T> {
        let response = self
            .http
            .post(format!("{}/{method}", self.base))
            .json(&payload)
            .send()
            .await?;
        Self::unwrap_response(response).await
    }

    pub async fn get_me(&self) -> Result<TgUser> {
        self.call("getMe", json!({})).await
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<TgUpdate>> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    pub async fn send_message(
        &self,
        chat: &str,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<TgMessage> {
        let mut payload = json!({
            "chat_id": Self::chat_param(chat),
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(message_id) = reply_to {
            payload["reply_to_message_id"] = json!(message_id);
        }
        self.call("sendMessage", payload).await
    }

    pub async fn edit_message_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                json!({
                    "chat_id": chat_id,
                    "message_id": message_id,
                    "text": text,
                    "parse_mode": "HTML",
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }

    pub async fn send_chat_action(&self, chat: &str, action: &str) -> Result<()> {
        let _: bool = self
            .call(
                "sendChatAction",
                json!({ "chat_id": Self::chat_param(chat), "action": action }),
            )
            .await?;
        Ok(())
    }

    pub async fn get_chat_administrators(&self, chat: &str) -> Result<Vec<TgChatMember>> {
        self.call(
            "getChatAdministrators",
            json!({ "chat_id": Self::chat_param(chat) }),
        )
        .await
    }

    pub async fn set_my_commands(&self, commands: &[(&str, &str)]) -> Result<()> {
        let commands: Vec<serde_json::Value> = commands
            .iter()
            .map(|(command, description)| json!({ "command": command, "description": description }))
            .collect();
        let _: bool = self
            .call("setMyCommands", json!({ "commands": commands }))
            .await?;
        Ok(())
    }

    async fn upload_part(path: &Path, index: usize) -> Result<reqwest::multipart::Part> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("file{index}"));
        Ok(reqwest::multipart::Part::bytes(bytes).file_name(file_name))
    }
}

#[async_trait]
impl MediaTransport for BotClient {
    async fn send_media_group(
        &self,
        chat: &str,
        kind: MediaKind,
        items: &[InputMedia],
        disable_notification: bool,
        reply_to: Option<i64>,
    ) -> Result<Vec<TgMessage>> {
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat.to_string())
            .text("disable_notification", disable_notification.to_string());
        if let Some(message_id) = reply_to {
            form = form.text("reply_to_message_id", message_id.to_string());
        }

        let mut media = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let media_ref = match &item.payload {
                MediaPayload::FileId(file_id) => file_id.clone(),
                MediaPayload::Upload(path) => {
                    form = form.part(format!("file{index}"), Self::upload_part(path, index).await?);
                    format!("attach://file{index}")
                }
            };

            let mut entry = json!({ "type": kind.api_name(), "media": media_ref });
            if let Some(caption) = &item.caption {
                entry["caption"] = json!(caption);
                entry["parse_mode"] = json!("HTML");
            }
            if item.spoiler && kind == MediaKind::Photo {
                entry["has_spoiler"] = json!(true);
            }
            media.push(entry);
        }
        form = form.text("media", serde_json::Value::Array(media).to_string());

        let response = self
            .http
            .post(format!("{}/sendMediaGroup", self.base))
            .multipart(form)
            .send()
            .await?;
        Self::unwrap_response(response).await
    }
}
