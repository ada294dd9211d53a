//! Configuration loading.
//!
//! One TOML file, read once at startup into an immutable [`Config`]. The path
//! resolution order is: explicit argument, then the `ARTRELAY_CONFIG`
//! environment variable, then `./artrelay.toml`.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Process configuration, immutable after startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Telegram bot token
    pub bot_token: String,

    /// Primary curated channel (`@name` or numeric chat id as string)
    pub channel: String,

    /// Discussion group linked to the channel; source of the bootstrap admin
    /// list and the place forwarded channel posts arrive
    pub comment_group: i64,

    /// Additional always-authorized actor ids
    #[serde(default)]
    pub admin_ids: Vec<i64>,

    /// Reject canonical re-submissions of already-published work ids
    #[serde(default = "default_true")]
    pub deduplication: bool,

    /// Notification-sound cooldown for channel publishes, in seconds
    #[serde(default = "default_notification_cooldown")]
    pub notification_cooldown_secs: u64,

    /// Route AI-flagged artworks to a secondary channel
    #[serde(default)]
    pub ai_redirect: bool,

    /// Secondary channel receiving redirected AI-flagged artworks
    #[serde(default)]
    pub ai_redirect_channel: Option<String>,

    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Root directory for downloaded originals (one subdirectory per platform)
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Pixiv web session cookie (PHPSESSID); unauthenticated requests see a
    /// reduced subset of works
    #[serde(default)]
    pub pixiv_session: Option<String>,

    /// Executable used for generic gallery extraction
    #[serde(default = "default_gallery_dl_bin")]
    pub gallery_dl_bin: String,

    /// Fixed text appended to every published caption
    #[serde(default)]
    pub caption_tail: String,

    /// Reply to `/help`
    #[serde(default = "default_help_text")]
    pub help_text: String,
}

fn default_true() -> bool {
    true
}

fn default_notification_cooldown() -> u64 {
    600
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/artrelay.db")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./data/downloads")
}

fn default_gallery_dl_bin() -> String {
    "gallery-dl".to_string()
}

fn default_help_text() -> String {
    "Submit an artwork with /post URL #tag; the artwork is published to the \
     channel and the originals land in the comment thread.\n\
     /echo URL #tag returns a private preview instead.\n\
     Optional tokens: p=1-3,5 tag=a,b from=… via=… silent=1 spoiler=1 nsfw=1 sfw=1"
        .to_string()
}

impl Config {
    /// Load configuration from the resolved TOML file.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var("ARTRELAY_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./artrelay.toml")),
        };

        let raw = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::parse(&raw)
    }

    /// Parse configuration from TOML text.
    pub fn parse(raw: &str) -> Result<Config> {
        let config: Config =
            toml::from_str(raw).map_err(|e| Error::Config(format!("bad config file: {e}")))?;

        if config.bot_token.trim().is_empty() {
            return Err(Error::Config("bot_token must not be empty".to_string()));
        }
        if config.channel.trim().is_empty() {
            return Err(Error::Config("channel must not be empty".to_string()));
        }
        if config.ai_redirect && config.ai_redirect_channel.is_none() {
            return Err(Error::Config(
                "ai_redirect requires ai_redirect_channel".to_string(),
            ));
        }

        Ok(config)
    }
}
