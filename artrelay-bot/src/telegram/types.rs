//! Telegram Bot API wire types, only the subset this service touches.

use artrelay_common::html_escape;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl TgUser {
    /// `@username` when present, full name otherwise.
    pub fn display_name(&self) -> String {
        if let Some(username) = &self.username {
            return format!("@{username}");
        }
        match &self.last_name {
            Some(last) => format!("{} {last}", self.first_name),
            None => self.first_name.clone(),
        }
    }

    pub fn mention_html(&self) -> String {
        format!(
            "<a href=\"tg://user?id={}\">{}</a>",
            self.id,
            html_escape(&self.display_name())
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgPhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgDocument {
    pub file_id: String,
}

/// Origin block on forwarded messages (Bot API ≥ 7); the legacy flat field is
/// kept alongside because channel-forward events still carry it.
#[derive(Debug, Clone, Deserialize)]
pub struct TgForwardOrigin {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub chat: TgChat,
    #[serde(default)]
    pub from: Option<TgUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<TgPhotoSize>>,
    #[serde(default)]
    pub document: Option<TgDocument>,
    #[serde(default)]
    pub reply_to_message: Option<Box<TgMessage>>,
    #[serde(default)]
    pub forward_from_message_id: Option<i64>,
    #[serde(default)]
    pub forward_origin: Option<TgForwardOrigin>,
}

impl TgMessage {
    /// Message id this message was forwarded from, through either API shape.
    pub fn forwarded_from_message_id(&self) -> Option<i64> {
        self.forward_from_message_id
            .or_else(|| self.forward_origin.as_ref().and_then(|origin| origin.message_id))
    }

    /// Public t.me link, when the chat has a username.
    pub fn link(&self) -> Option<String> {
        self.chat
            .username
            .as_ref()
            .map(|username| format!("https://t.me/{username}/{}", self.message_id))
    }

    /// Text or caption, whichever the message carries.
    pub fn text_content(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }

    /// file_id of the largest photo rendition, if this is a photo message.
    pub fn largest_photo_file_id(&self) -> Option<&str> {
        self.photo
            .as_ref()
            .and_then(|sizes| sizes.last())
            .map(|size| size.file_id.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChatMember {
    pub user: TgUser,
}

/// Media group flavor: previews go out as photos, originals as documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Document,
}

impl MediaKind {
    pub fn api_name(self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Document => "document",
        }
    }
}

/// What to send for one media item: a file_id the destination already knows,
/// or a local file to upload.
#[derive(Debug, Clone)]
pub enum MediaPayload {
    FileId(String),
    Upload(PathBuf),
}

/// One entry of an outbound media group.
#[derive(Debug, Clone)]
pub struct InputMedia {
    pub payload: MediaPayload,
    /// HTML caption; the delivery protocol attaches it to the first item only
    pub caption: Option<String>,
    pub spoiler: bool,
}

impl InputMedia {
    pub fn file_id(id: impl Into<String>) -> Self {
        Self {
            payload: MediaPayload::FileId(id.into()),
            caption: None,
            spoiler: false,
        }
    }

    pub fn upload(path: impl Into<PathBuf>) -> Self {
        Self {
            payload: MediaPayload::Upload(path.into()),
            caption: None,
            spoiler: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_prefers_username() {
        let user: TgUser = serde_json::from_value(serde_json::json!({
            "id": 1, "first_name": "A", "last_name": "B", "username": "ab"
        }))
        .unwrap();
        assert_eq!(user.display_name(), "@ab");

        let user: TgUser =
            serde_json::from_value(serde_json::json!({ "id": 1, "first_name": "A", "last_name": "B" }))
                .unwrap();
        assert_eq!(user.display_name(), "A B");
    }

    #[test]
    fn forwarded_id_reads_both_shapes() {
        let legacy: TgMessage = serde_json::from_value(serde_json::json!({
            "message_id": 5, "chat": { "id": 1 }, "forward_from_message_id": 99
        }))
        .unwrap();
        assert_eq!(legacy.forwarded_from_message_id(), Some(99));

        let modern: TgMessage = serde_json::from_value(serde_json::json!({
            "message_id": 5, "chat": { "id": 1 },
            "forward_origin": { "type": "channel", "message_id": 42 }
        }))
        .unwrap();
        assert_eq!(modern.forwarded_from_message_id(), Some(42));
    }

    #[test]
    fn message_link_needs_chat_username() {
        let message: TgMessage = serde_json::from_value(serde_json::json!({
            "message_id": 7, "chat": { "id": 1, "username": "artworks" }
        }))
        .unwrap();
        assert_eq!(message.link().as_deref(), Some("https://t.me/artworks/7"));
    }
}
