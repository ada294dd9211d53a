//! Tag audit rows: (work_id, tag), append-only, never read back by the
//! pipeline.

use anyhow::Result;
use sqlx::SqliteConnection;

/// Append curated tags for a work id.
pub async fn append(conn: &mut SqliteConnection, work_id: &str, tags: &[String]) -> Result<()> {
    for tag in tags {
        sqlx::query("INSERT INTO artwork_tags (work_id, tag) VALUES (?, ?)")
            .bind(work_id)
            .bind(tag)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Row count for a work id. Test and maintenance surface only.
pub async fn count_for_work(conn: &mut SqliteConnection, work_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM artwork_tags WHERE work_id = ?")
        .bind(work_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(count)
}
