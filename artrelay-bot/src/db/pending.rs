//! Pending restart confirmations.
//!
//! Before a restart exits, the in-flight status message is recorded here; the
//! next startup edits that message to report success and clears the row. A
//! typed store entity instead of a status blob at a well-known path, so crash
//! recovery is just "read the table".

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

/// One confirmation message awaiting a post-restart edit.
#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    pub chat_id: i64,
    pub message_id: i64,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

/// Record a confirmation message to be completed after restart.
pub async fn insert(
    conn: &mut SqliteConnection,
    chat_id: i64,
    message_id: i64,
    note: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO pending_confirmations (chat_id, message_id, note, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(chat_id)
    .bind(message_id)
    .bind(note)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Drain all pending confirmations (consumed at startup).
pub async fn take_all(conn: &mut SqliteConnection) -> Result<Vec<PendingConfirmation>> {
    let rows = sqlx::query("SELECT chat_id, message_id, note, created_at FROM pending_confirmations")
        .fetch_all(&mut *conn)
        .await?;

    let mut pending = Vec::with_capacity(rows.len());
    for row in &rows {
        let created_at: String = row.get("created_at");
        pending.push(PendingConfirmation {
            chat_id: row.get("chat_id"),
            message_id: row.get("message_id"),
            note: row.get("note"),
            created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
        });
    }

    sqlx::query("DELETE FROM pending_confirmations")
        .execute(&mut *conn)
        .await?;

    Ok(pending)
}
