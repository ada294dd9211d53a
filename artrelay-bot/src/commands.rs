//! Command surface: token parsing, permission guard, handler dispatch, and
//! the startup bootstrap (admin list, pending-confirmation recovery).
//!
//! The handlers are thin: they parse, guard, call the pipeline/publisher,
//! and report. Persistence failures inside a handler bubble up to the
//! dispatcher, which reports one generic failure to the requester.

use crate::backrefs::BackrefCache;
use crate::db::{self, artworks, pending};
use crate::models::{ArtworkParam, Contributor, MessageRef};
use crate::originals;
use crate::pipeline::{run_pipeline, WorkLocks};
use crate::platforms::AdapterContext;
use crate::publisher::Publisher;
use crate::telegram::{BotClient, MediaTransport, TgMessage, TgUpdate};
use artrelay_common::{parse_page_ranges, Config};
use regex::Regex;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Telegram's service account; channel posts arrive in the discussion group
/// forwarded by it.
const TELEGRAM_SERVICE_USER: i64 = 777000;

const DENIED_TEXT: &str = "You are not an operator of this channel.";
const GENERIC_HANDLER_FAILURE: &str = "Something went wrong while handling that command.";

/// Shared application state, one per process.
pub struct AppState {
    pub config: Arc<Config>,
    pub bot: Arc<BotClient>,
    pub pool: SqlitePool,
    pub ctx: AdapterContext,
    pub locks: WorkLocks,
    pub publisher: Publisher,
    pub backrefs: Arc<BackrefCache>,
    /// Admins of the discussion group, fetched at startup and on demand
    pub admins: RwLock<HashSet<i64>>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub async fn init(config: Config) -> anyhow::Result<Arc<Self>> {
        let config = Arc::new(config);
        std::fs::create_dir_all(&config.download_dir)?;

        let pool = db::init_pool(&config.db_path).await?;
        let bot = Arc::new(BotClient::new(&config.bot_token)?);
        let ctx = AdapterContext::new(config.clone())?;
        let backrefs = Arc::new(BackrefCache::with_defaults());
        let transport: Arc<dyn MediaTransport> = bot.clone();
        let publisher = Publisher::new(transport, config.clone(), backrefs.clone());

        Ok(Arc::new(Self {
            config,
            bot,
            pool,
            ctx,
            locks: WorkLocks::new(),
            publisher,
            backrefs,
            admins: RwLock::new(HashSet::new()),
            shutdown: CancellationToken::new(),
        }))
    }

    pub async fn is_admin(&self, user_id: i64) -> bool {
        self.config.admin_ids.contains(&user_id) || self.admins.read().await.contains(&user_id)
    }
}

/// Edit the pending restart confirmations left by the previous process.
pub async fn recover_pending(state: &AppState) -> anyhow::Result<()> {
    let mut conn = state.pool.acquire().await?;
    for confirmation in pending::take_all(conn.as_mut()).await? {
        if let Err(e) = state
            .bot
            .edit_message_text(
                confirmation.chat_id,
                confirmation.message_id,
                "Restart complete.",
            )
            .await
        {
            tracing::warn!(error = %e, "could not edit pending confirmation");
        }
    }
    Ok(())
}

/// Refresh the admin cache from the discussion group. Best effort.
pub async fn refresh_admins(state: &AppState) {
    match state
        .bot
        .get_chat_administrators(&state.config.comment_group.to_string())
        .await
    {
        Ok(members) => {
            let ids: HashSet<i64> = members.iter().map(|member| member.user.id).collect();
            tracing::info!(count = ids.len(), "admin list refreshed");
            *state.admins.write().await = ids;
        }
        Err(e) => tracing::warn!(error = %e, "could not fetch chat administrators"),
    }
}

/// Entry point for one inbound update; errors collapse into one generic
/// failure reply.
pub async fn handle_update(state: Arc<AppState>, update: TgUpdate) {
    let Some(message) = update.message else {
        return;
    };
    if let Err(e) = dispatch_message(&state, &message).await {
        tracing::error!(error = %e, "command handling failed");
        let _ = state
            .bot
            .send_message(
                &message.chat.id.to_string(),
                GENERIC_HANDLER_FAILURE,
                Some(message.message_id),
            )
            .await;
    }
}

async fn dispatch_message(state: &AppState, message: &TgMessage) -> anyhow::Result<()> {
    // Forwarded channel posts feed the automatic originals path
    if message.photo.is_some()
        && message.forwarded_from_message_id().is_some()
        && message.from.as_ref().is_some_and(|from| from.id == TELEGRAM_SERVICE_USER)
    {
        let _ = state
            .bot
            .send_chat_action(&message.chat.id.to_string(), "upload_document")
            .await;
        originals::handle_forward_event(
            state.bot.as_ref(),
            &state.config,
            &state.pool,
            &state.backrefs,
            message,
        )
        .await?;
        return Ok(());
    }

    let Some(text) = message.text.as_deref() else {
        return Ok(());
    };
    if !text.starts_with('/') {
        return Ok(());
    }
    let command = text.split_whitespace().next().unwrap_or("");
    let command = command.split('@').next().unwrap_or(command);

    match command {
        "/start" | "/ping" => {
            let greeting = match &message.from {
                Some(user) => format!("Hi {}!", user.mention_html()),
                None => "Hi!".to_string(),
            };
            reply(state, message, &greeting).await?;
        }
        "/help" => reply(state, message, &state.config.help_text).await?,
        "/post" => {
            if require_admin(state, message).await? {
                handle_submission(state, message, true).await?;
            }
        }
        "/echo" => handle_submission(state, message, false).await?,
        "/unmark_dup" => {
            if require_admin(state, message).await? {
                handle_unmark(state, message).await?;
            }
        }
        "/repost_orig" => {
            if require_admin(state, message).await? {
                handle_repost(state, message).await?;
            }
        }
        "/get_admins" => {
            if require_admin(state, message).await? {
                refresh_admins(state).await;
                reply(state, message, "Admin list refreshed.").await?;
            }
        }
        "/set_commands" => {
            if require_admin(state, message).await? {
                state
                    .bot
                    .set_my_commands(&[
                        ("post", "(admin) /post url #tag publish to the channel"),
                        ("echo", "/echo url #tag private preview"),
                        ("unmark_dup", "(admin) /unmark_dup url forget an artwork"),
                        ("repost_orig", "(admin) reply to a post to re-serve originals"),
                        ("restart", "(admin) restart the service"),
                        ("ping", "hello"),
                    ])
                    .await?;
                reply(state, message, "Commands registered.").await?;
            }
        }
        "/restart" => {
            if require_admin(state, message).await? {
                handle_restart(state, message).await?;
            }
        }
        _ => {}
    }

    Ok(())
}

async fn reply(state: &AppState, message: &TgMessage, text: &str) -> anyhow::Result<()> {
    state
        .bot
        .send_message(&message.chat.id.to_string(), text, Some(message.message_id))
        .await?;
    Ok(())
}

/// Permission guard: checked before any side effect; denial short-circuits.
async fn require_admin(state: &AppState, message: &TgMessage) -> anyhow::Result<bool> {
    let allowed = match &message.from {
        Some(user) => state.is_admin(user.id).await,
        None => false,
    };
    if !allowed {
        tracing::warn!(
            user = message.from.as_ref().map(|u| u.id),
            "permission denied"
        );
        reply(state, message, DENIED_TEXT).await?;
    }
    Ok(allowed)
}

/// `/post` (canonical) and `/echo` (preview) share the pipeline; only the
/// destination and the dedup/promotion semantics differ.
async fn handle_submission(
    state: &AppState,
    message: &TgMessage,
    canonical: bool,
) -> anyhow::Result<()> {
    let Some(user) = &message.from else {
        return Ok(());
    };
    let chat = message.chat.id.to_string();
    let text = message.text.as_deref().unwrap_or_default();

    let (url, param) = match parse_submission(text) {
        Ok(parsed) => parsed,
        Err(reason) => {
            reply(state, message, &reason).await?;
            return Ok(());
        }
    };

    let hint = state
        .bot
        .send_message(&chat, "Fetching the artwork...", Some(message.message_id))
        .await
        .ok()
        .map(|sent| MessageRef {
            chat_id: sent.chat.id,
            message_id: sent.message_id,
            link: sent.link(),
        });

    let contributor = Contributor::new(user.id, user.display_name());
    let mut tx = state.pool.begin().await?;
    let mut result = run_pipeline(
        &state.ctx,
        &mut tx,
        &state.locks,
        &url,
        param,
        &contributor,
        canonical,
    )
    .await?;
    result.hint_msg = hint;

    if !result.success {
        drop(tx); // nothing staged survives
        report(state, message, &result.hint_msg, &result.feedback).await?;
        return Ok(());
    }

    let _ = state.bot.send_chat_action(&chat, "upload_photo").await;
    result.caption.push_str(&state.config.caption_tail);

    let destination = if canonical {
        state.config.channel.clone()
    } else {
        chat.clone()
    };
    if let Err(e) = state.publisher.publish(&mut result, &destination).await {
        drop(tx); // published chunks stay live; the store records nothing
        tracing::error!(error = %e, "publish failed");
        report(
            state,
            message,
            &result.hint_msg,
            "Publishing failed. Earlier batches (if any) remain in the channel.",
        )
        .await?;
        return Ok(());
    }

    if !canonical {
        // Previews get the originals in the same chat right away
        let _ = state.bot.send_chat_action(&chat, "upload_document").await;
        originals::send_original_batches(
            state.bot.as_ref(),
            &state.config,
            &chat,
            None,
            &mut result.records,
            originals::PACING_PER_ITEM,
        )
        .await?;
    }

    artworks::update_remote_handles(&mut tx, &result.records).await?;
    tx.commit().await?;

    let mut feedback = result.feedback.clone();
    if let Some(published) = &result.published_msg {
        if let Some(link) = &published.link {
            feedback.push_str(&format!("\n{link}"));
        }
    }
    report(state, message, &result.hint_msg, &feedback).await?;

    Ok(())
}

/// Edit the hint message when there is one, reply otherwise.
async fn report(
    state: &AppState,
    message: &TgMessage,
    hint: &Option<MessageRef>,
    text: &str,
) -> anyhow::Result<()> {
    match hint {
        Some(hint) => {
            state
                .bot
                .edit_message_text(hint.chat_id, hint.message_id, text)
                .await?
        }
        None => reply(state, message, text).await?,
    }
    Ok(())
}

async fn handle_unmark(state: &AppState, message: &TgMessage) -> anyhow::Result<()> {
    // Prefer a URL in the replied-to message, fall back to the last token
    let work_id = match &message.reply_to_message {
        Some(replied) => replied
            .text_content()
            .and_then(|text| find_urls(text).into_iter().next())
            .map(|url| originals::work_id_from_url_tail(&url)),
        None => message
            .text
            .as_deref()
            .and_then(|text| text.split_whitespace().nth(1))
            .map(originals::work_id_from_url_tail),
    };

    let Some(work_id) = work_id else {
        reply(state, message, "No work id found. Usage: /unmark_dup URL").await?;
        return Ok(());
    };

    let mut conn = state.pool.acquire().await?;
    let removed = artworks::unmark(conn.as_mut(), &work_id).await?;
    reply(
        state,
        message,
        &format!("Removed {removed} record(s) for {work_id}."),
    )
    .await?;
    Ok(())
}

async fn handle_repost(state: &AppState, message: &TgMessage) -> anyhow::Result<()> {
    let Some(replied) = message.reply_to_message.as_deref() else {
        reply(state, message, "Reply to a published message to replay its originals.").await?;
        return Ok(());
    };
    let url = replied
        .text_content()
        .and_then(|text| find_urls(text).into_iter().next());
    let Some(url) = url else {
        reply(state, message, "The replied message carries no URL.").await?;
        return Ok(());
    };

    let _ = state
        .bot
        .send_chat_action(&message.chat.id.to_string(), "upload_document")
        .await;
    let replayed = originals::replay_for_url(
        state.bot.as_ref(),
        &state.config,
        &state.pool,
        replied,
        &url,
    )
    .await?;

    if replayed == 0 {
        reply(state, message, "No canonical records for that work.").await?;
    } else {
        // The invoking command disappears once the replay landed
        let _ = state
            .bot
            .delete_message(message.chat.id, message.message_id)
            .await;
    }
    Ok(())
}

/// Persist the confirmation reference, then stop the polling loop; the
/// supervisor restarts the process and startup edits the message.
async fn handle_restart(state: &AppState, message: &TgMessage) -> anyhow::Result<()> {
    let sent = state
        .bot
        .send_message(
            &message.chat.id.to_string(),
            "Restarting, back in a moment...",
            Some(message.message_id),
        )
        .await?;

    let mut conn = state.pool.acquire().await?;
    pending::insert(conn.as_mut(), sent.chat.id, sent.message_id, "restart").await?;

    tracing::info!("restart requested, shutting down");
    state.shutdown.cancel();
    Ok(())
}

// ============================================================================
// Token parsing
// ============================================================================

/// Parse a submission command: the first token after the command is the URL,
/// the rest are `#hashtags` and `key=value` options.
pub fn parse_submission(text: &str) -> Result<(String, ArtworkParam), String> {
    let mut tokens = text.split_whitespace();
    let _command = tokens.next();
    let url = tokens
        .next()
        .ok_or_else(|| "Usage: /post URL #tag [p=1-3,5] [tag=a,b] [from=] [via=] [silent=1] [spoiler=1] [nsfw=1|sfw=1]".to_string())?;

    let mut param = ArtworkParam::default();
    for token in tokens {
        if let Some(tag) = token.strip_prefix('#') {
            if !tag.is_empty() {
                param.tags.push(tag.to_string());
            }
        } else if let Some((key, value)) = token.split_once('=') {
            match key {
                "p" | "pages" => {
                    param.pages = Some(
                        parse_page_ranges(value).map_err(|e| format!("Bad page range: {e}"))?,
                    )
                }
                "tag" | "tags" => param.tags.extend(
                    value
                        .split(',')
                        .filter(|tag| !tag.is_empty())
                        .map(|tag| tag.to_string()),
                ),
                "from" => param.source_from = Some(value.to_string()),
                "via" => param.source_via = Some(value.to_string()),
                "silent" => param.silent = Some(parse_bool(value)),
                "spoiler" => param.spoiler = Some(parse_bool(value)),
                "nsfw" => param.nsfw_override = Some(parse_bool(value)),
                "sfw" => {
                    if parse_bool(value) {
                        param.nsfw_override = Some(false);
                    }
                }
                _ => {} // unknown keys are ignored
            }
        }
    }

    Ok((url.to_string(), param))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

/// Every http(s) URL in a message text.
pub fn find_urls(text: &str) -> Vec<String> {
    static URL: OnceLock<Regex> = OnceLock::new();
    let url = URL.get_or_init(|| Regex::new(r"https?://\S+").expect("url regex is valid"));
    url.find_iter(text).map(|m| m.as_str().to_string()).collect()
}
