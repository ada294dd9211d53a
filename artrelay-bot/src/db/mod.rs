//! Database access for artrelay-bot
//!
//! Two content tables (artwork page rows keyed by (platform, work_id, page)
//! and an append-only tag audit) plus the pending-confirmation rows used by
//! the restart continuation. All operations take `&mut SqliteConnection` so
//! they run equally on a pool connection or on a transaction staged by the
//! pipeline.

pub mod artworks;
pub mod pending;
pub mod tags;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize the database connection pool.
pub async fn init_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create tables if they don't exist.
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artworks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            platform TEXT NOT NULL,
            work_id TEXT NOT NULL,
            page INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            user_name TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            author TEXT NOT NULL DEFAULT '',
            author_id TEXT NOT NULL DEFAULT '',
            url_original TEXT NOT NULL,
            url_thumb TEXT NOT NULL DEFAULT '',
            file_name TEXT NOT NULL,
            extension TEXT NOT NULL DEFAULT '',
            size INTEGER,
            width INTEGER,
            height INTEGER,
            explicit INTEGER NOT NULL DEFAULT 0,
            ai_generated INTEGER NOT NULL DEFAULT 0,
            guest INTEGER NOT NULL DEFAULT 0,
            raw_meta TEXT NOT NULL DEFAULT '{}',
            tg_file_thumb TEXT,
            tg_file_original TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            post_count INTEGER NOT NULL DEFAULT 1,
            UNIQUE(platform, work_id, page)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artworks_work ON artworks(work_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artwork_tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            work_id TEXT NOT NULL,
            tag TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pending_confirmations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id INTEGER NOT NULL,
            message_id INTEGER NOT NULL,
            note TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (artworks, artwork_tags, pending_confirmations)");

    Ok(())
}
