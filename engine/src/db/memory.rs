/// Memory store: append-only record of completed phases
///
/// Each entry is immutable once written. Payloads are validated against the
/// schema of their phase before insertion; a mismatch is a `ValidationError`
/// and nothing is written. Ordering is by timestamp ascending with the
/// insertion sequence breaking ties, and the sequence number is what the
/// continuity ledger records as its memory cursor.
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use sdk::{KernelError, Outcome, Phase};

/// A single immutable memory record.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntry {
    /// Insertion sequence; `None` until the entry is committed.
    pub seq: Option<i64>,
    pub id: String,
    /// Objective id this entry belongs to.
    pub subject: String,
    pub phase: Phase,
    pub payload: serde_json::Value,
    pub outcome: Outcome,
    /// Unix milliseconds.
    pub timestamp: i64,
}

impl MemoryEntry {
    pub fn new(
        subject: impl Into<String>,
        phase: Phase,
        payload: serde_json::Value,
        outcome: Outcome,
    ) -> Self {
        Self {
            seq: None,
            id: Uuid::new_v4().to_string(),
            subject: subject.into(),
            phase,
            payload,
            outcome,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Insert an entry inside an open transaction. Used by `Database::commit_phase`
/// so the append and the ledger write land atomically. Payload validation is
/// the caller's responsibility at this level.
pub(crate) async fn append_in(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    entry: &MemoryEntry,
) -> Result<i64> {
    let payload_text =
        serde_json::to_string(&entry.payload).context("Failed to serialize payload")?;

    let result = sqlx::query(
        "INSERT INTO memory_entries (entry_id, subject, phase, payload, outcome, timestamp) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id)
    .bind(&entry.subject)
    .bind(entry.phase.as_str())
    .bind(payload_text)
    .bind(entry.outcome.as_str())
    .bind(entry.timestamp)
    .execute(&mut **tx)
    .await
    .context("Failed to append memory entry")?;

    Ok(result.last_insert_rowid())
}

/// Memory store repository.
pub struct MemoryStore {
    pool: SqlitePool,
}

impl MemoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a single entry. Fails with `ValidationError` if the payload does
    /// not match the phase's schema; no partial write is ever visible.
    pub async fn append(&self, entry: &MemoryEntry) -> Result<i64, KernelError> {
        sdk::validate_payload(entry.phase, &entry.payload)
            .map_err(|e| KernelError::Validation(format!("{} payload: {}", entry.phase, e)))?;

        let mut tx = self.pool.begin().await.map_err(storage)?;
        let seq = append_in(&mut tx, entry)
            .await
            .map_err(|e| KernelError::Storage(e.to_string()))?;
        tx.commit().await.map_err(storage)?;

        Ok(seq)
    }

    /// Query entries for a subject, optionally filtered by phase and by a
    /// minimum timestamp. Ordered by timestamp ascending, insertion order
    /// breaking ties.
    pub async fn query(
        &self,
        subject: &str,
        phase: Option<Phase>,
        since: Option<i64>,
    ) -> Result<Vec<MemoryEntry>, KernelError> {
        let mut sql = String::from(
            "SELECT seq, entry_id, subject, phase, payload, outcome, timestamp \
             FROM memory_entries WHERE subject = ?",
        );
        if phase.is_some() {
            sql.push_str(" AND phase = ?");
        }
        if since.is_some() {
            sql.push_str(" AND timestamp >= ?");
        }
        sql.push_str(" ORDER BY timestamp ASC, seq ASC");

        let mut query = sqlx::query(&sql).bind(subject);
        if let Some(p) = phase {
            query = query.bind(p.as_str());
        }
        if let Some(t) = since {
            query = query.bind(t);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(storage)?;
        rows.into_iter().map(from_row).collect()
    }

    /// Entries committed strictly after the given sequence number, in order.
    /// This is the resume path: the ledger's cursor plus this query
    /// reconstructs everything the snapshot does not carry.
    pub async fn query_after(
        &self,
        subject: &str,
        cursor: i64,
    ) -> Result<Vec<MemoryEntry>, KernelError> {
        let rows = sqlx::query(
            "SELECT seq, entry_id, subject, phase, payload, outcome, timestamp \
             FROM memory_entries WHERE subject = ? AND seq > ? \
             ORDER BY timestamp ASC, seq ASC",
        )
        .bind(subject)
        .bind(cursor)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.into_iter().map(from_row).collect()
    }

    /// Most recent entry for a subject, if any.
    pub async fn latest(&self, subject: &str) -> Result<Option<MemoryEntry>, KernelError> {
        let row = sqlx::query(
            "SELECT seq, entry_id, subject, phase, payload, outcome, timestamp \
             FROM memory_entries WHERE subject = ? \
             ORDER BY timestamp DESC, seq DESC LIMIT 1",
        )
        .bind(subject)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.map(from_row).transpose()
    }

    /// Most recent entry of one phase for a subject, if any.
    pub async fn latest_of_phase(
        &self,
        subject: &str,
        phase: Phase,
    ) -> Result<Option<MemoryEntry>, KernelError> {
        let row = sqlx::query(
            "SELECT seq, entry_id, subject, phase, payload, outcome, timestamp \
             FROM memory_entries WHERE subject = ? AND phase = ? \
             ORDER BY timestamp DESC, seq DESC LIMIT 1",
        )
        .bind(subject)
        .bind(phase.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.map(from_row).transpose()
    }
}

fn storage(e: sqlx::Error) -> KernelError {
    KernelError::Storage(e.to_string())
}

fn from_row(r: sqlx::sqlite::SqliteRow) -> Result<MemoryEntry, KernelError> {
    let phase_text: String = r.get("phase");
    let outcome_text: String = r.get("outcome");
    let payload_text: String = r.get("payload");

    Ok(MemoryEntry {
        seq: Some(r.get("seq")),
        id: r.get("entry_id"),
        subject: r.get("subject"),
        phase: Phase::parse(&phase_text)
            .ok_or_else(|| KernelError::Storage(format!("unknown phase '{phase_text}'")))?,
        payload: serde_json::from_str(&payload_text)
            .map_err(|e| KernelError::Storage(format!("corrupt payload: {e}")))?,
        outcome: Outcome::parse(&outcome_text)
            .ok_or_else(|| KernelError::Storage(format!("unknown outcome '{outcome_text}'")))?,
        timestamp: r.get("timestamp"),
    })
}
