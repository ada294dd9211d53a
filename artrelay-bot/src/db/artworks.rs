//! Artwork page persistence: dedup lookup, cache lookup, staging inserts,
//! repost bookkeeping and the administrative unmark.

use crate::models::{ArtworkRecord, Contributor};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ArtworkRecord> {
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    Ok(ArtworkRecord {
        platform: row.get("platform"),
        work_id: row.get("work_id"),
        page: row.get("page"),
        user_id: row.get("user_id"),
        user_name: row.get("user_name"),
        title: row.get("title"),
        author: row.get("author"),
        author_id: row.get("author_id"),
        url_original: row.get("url_original"),
        url_thumb: row.get("url_thumb"),
        file_name: row.get("file_name"),
        extension: row.get("extension"),
        size: row.get("size"),
        width: row.get("width"),
        height: row.get("height"),
        explicit: row.get::<i64, _>("explicit") != 0,
        ai_generated: row.get::<i64, _>("ai_generated") != 0,
        guest: row.get::<i64, _>("guest") != 0,
        raw_meta: row.get("raw_meta"),
        tg_file_thumb: row.get("tg_file_thumb"),
        tg_file_original: row.get("tg_file_original"),
        created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)?.with_timezone(&Utc),
        post_count: row.get("post_count"),
    })
}

/// First canonical (non-guest) page for a work id, if any.
///
/// Consulted only for canonical-mode publishes with dedup enabled; guest rows
/// never count as duplicates.
pub async fn find_duplicate(
    conn: &mut SqliteConnection,
    platform: &str,
    work_id: &str,
) -> Result<Option<ArtworkRecord>> {
    let row = sqlx::query(
        r#"
        SELECT * FROM artworks
        WHERE platform = ? AND work_id = ? AND guest = 0
        ORDER BY page
        LIMIT 1
        "#,
    )
    .bind(platform)
    .bind(work_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(record_from_row).transpose()
}

/// All pages for a work id in page order, guest or not.
pub async fn find_cached(
    conn: &mut SqliteConnection,
    platform: &str,
    work_id: &str,
) -> Result<Vec<ArtworkRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM artworks
        WHERE platform = ? AND work_id = ?
        ORDER BY page
        "#,
    )
    .bind(platform)
    .bind(work_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(record_from_row).collect()
}

/// Stage one page row. The identity key is UNIQUE, so a concurrent submission
/// that raced past the advisory lock lands on the conflict arm instead of
/// duplicating the page.
pub async fn insert(conn: &mut SqliteConnection, record: &ArtworkRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO artworks (
            platform, work_id, page, user_id, user_name, title, author,
            author_id, url_original, url_thumb, file_name, extension, size,
            width, height, explicit, ai_generated, guest, raw_meta,
            tg_file_thumb, tg_file_original, created_at, updated_at, post_count
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(platform, work_id, page) DO UPDATE SET
            user_id = excluded.user_id,
            user_name = excluded.user_name,
            guest = MIN(guest, excluded.guest),
            updated_at = excluded.updated_at,
            post_count = post_count + 1
        "#,
    )
    .bind(&record.platform)
    .bind(&record.work_id)
    .bind(record.page)
    .bind(record.user_id)
    .bind(&record.user_name)
    .bind(&record.title)
    .bind(&record.author)
    .bind(&record.author_id)
    .bind(&record.url_original)
    .bind(&record.url_thumb)
    .bind(&record.file_name)
    .bind(&record.extension)
    .bind(record.size)
    .bind(record.width)
    .bind(record.height)
    .bind(record.explicit as i64)
    .bind(record.ai_generated as i64)
    .bind(record.guest as i64)
    .bind(&record.raw_meta)
    .bind(&record.tg_file_thumb)
    .bind(&record.tg_file_original)
    .bind(record.created_at.to_rfc3339())
    .bind(record.updated_at.to_rfc3339())
    .bind(record.post_count)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Repost bookkeeping on a cache hit: bump update timestamp and counter on
/// every page; a canonical repost additionally promotes guest rows and
/// overwrites the contributor.
pub async fn touch_reposted(
    conn: &mut SqliteConnection,
    platform: &str,
    work_id: &str,
    contributor: &Contributor,
    canonical: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE artworks
        SET updated_at = ?, post_count = post_count + 1
        WHERE platform = ? AND work_id = ?
        "#,
    )
    .bind(now.to_rfc3339())
    .bind(platform)
    .bind(work_id)
    .execute(&mut *conn)
    .await?;

    if canonical {
        sqlx::query(
            r#"
            UPDATE artworks
            SET guest = 0, user_id = ?, user_name = ?
            WHERE platform = ? AND work_id = ?
            "#,
        )
        .bind(contributor.id)
        .bind(&contributor.name)
        .bind(platform)
        .bind(work_id)
        .execute(&mut *conn)
        .await?;
    } else {
        // Guest rows keep tracking their latest previewer
        sqlx::query(
            r#"
            UPDATE artworks
            SET user_id = ?, user_name = ?
            WHERE platform = ? AND work_id = ? AND guest = 1
            "#,
        )
        .bind(contributor.id)
        .bind(&contributor.name)
        .bind(platform)
        .bind(work_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Persist the Telegram file_ids returned by a send, so later publishes skip
/// the byte upload.
pub async fn update_remote_handles(
    conn: &mut SqliteConnection,
    records: &[ArtworkRecord],
) -> Result<()> {
    for record in records {
        sqlx::query(
            r#"
            UPDATE artworks
            SET tg_file_thumb = ?, tg_file_original = ?
            WHERE platform = ? AND work_id = ? AND page = ?
            "#,
        )
        .bind(&record.tg_file_thumb)
        .bind(&record.tg_file_original)
        .bind(&record.platform)
        .bind(&record.work_id)
        .bind(record.page)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Administrative unmark: delete every page row for a work id. Returns the
/// number of rows removed.
pub async fn unmark(conn: &mut SqliteConnection, work_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM artworks WHERE work_id = ?")
        .bind(work_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

/// All canonical pages for a work id regardless of platform, in page order.
/// Used by the manual originals replay, which only has a URL to go by.
pub async fn find_canonical_pages(
    conn: &mut SqliteConnection,
    work_id: &str,
) -> Result<Vec<ArtworkRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM artworks
        WHERE work_id = ? AND guest = 0
        ORDER BY page
        "#,
    )
    .bind(work_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(record_from_row).collect()
}
