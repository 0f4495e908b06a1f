use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use log::warn;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::oneshot;

use crate::db::{connection::Database, helpers::parse_datetime, models::AnchorRecord};

fn upsert_anchor(conn: &mut Connection, anchor_id: &str, note_content: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    conn.execute(
        "INSERT INTO anchors (anchor_id, note_content, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(anchor_id) DO UPDATE
         SET note_content = excluded.note_content,
             updated_at = excluded.updated_at",
        params![anchor_id, note_content, now],
    )
    .with_context(|| format!("failed to store anchor {anchor_id}"))?;
    Ok(())
}

fn row_to_record(row: &Row) -> Result<AnchorRecord> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(AnchorRecord {
        anchor_id: row.get("anchor_id")?,
        note_content: row.get("note_content")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    /// Inserts or overwrites the record for `anchor_id`.
    pub async fn put_anchor(&self, anchor_id: &str, note_content: &str) -> Result<()> {
        let anchor_id = anchor_id.to_string();
        let note_content = note_content.to_string();
        self.execute(move |conn| upsert_anchor(conn, &anchor_id, &note_content))
            .await
    }

    /// Queues an upsert now; the receiver yields its outcome once the writer thread ran it.
    pub fn queue_put_anchor(
        &self,
        anchor_id: &str,
        note_content: &str,
    ) -> Result<oneshot::Receiver<Result<()>>> {
        let anchor_id = anchor_id.to_string();
        let note_content = note_content.to_string();
        self.enqueue(move |conn| upsert_anchor(conn, &anchor_id, &note_content))
    }

    pub async fn get_anchor(&self, anchor_id: &str) -> Result<Option<AnchorRecord>> {
        let anchor_id = anchor_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT anchor_id, note_content, created_at, updated_at
                 FROM anchors
                 WHERE anchor_id = ?1",
            )?;
            let record = stmt
                .query_row(params![anchor_id], |row| Ok(row_to_record(row)))
                .optional()?
                .transpose()?;
            Ok(record)
        })
        .await
    }

    /// Returns whether a record was removed.
    pub async fn delete_anchor(&self, anchor_id: &str) -> Result<bool> {
        let anchor_id = anchor_id.to_string();
        self.execute(move |conn| {
            let removed = conn
                .execute("DELETE FROM anchors WHERE anchor_id = ?1", params![anchor_id])
                .with_context(|| format!("failed to delete anchor {anchor_id}"))?;
            Ok(removed > 0)
        })
        .await
    }

    /// Like [`Database::delete_anchor`] but returns as soon as the delete is queued. Any read
    /// issued afterwards observes it.
    pub fn queue_delete_anchor(&self, anchor_id: &str) -> Result<()> {
        let anchor_id = anchor_id.to_string();
        self.submit("delete_anchor", move |conn| {
            conn.execute("DELETE FROM anchors WHERE anchor_id = ?1", params![anchor_id])
                .with_context(|| format!("failed to delete anchor {anchor_id}"))?;
            Ok(())
        })
    }

    pub async fn list_anchor_ids(&self) -> Result<Vec<String>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT anchor_id FROM anchors ORDER BY created_at ASC, rowid ASC")?;
            let mut rows = stmt.query([])?;
            let mut ids: Vec<String> = Vec::new();
            while let Some(row) = rows.next()? {
                ids.push(row.get(0)?);
            }
            Ok(ids)
        })
        .await
    }

    /// All records in insertion order. Rows that fail to decode are skipped with a warning.
    pub async fn list_anchor_records(&self) -> Result<Vec<AnchorRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT anchor_id, note_content, created_at, updated_at
                 FROM anchors
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                match row_to_record(row) {
                    Ok(record) => records.push(record),
                    Err(err) => warn!("Skipping unreadable anchor row: {err:#}"),
                }
            }
            Ok(records)
        })
        .await
    }
}
