/// Continuity ledger: one live snapshot per active objective
///
/// The snapshot is overwritten at each phase boundary (never appended) and
/// deleted when the objective reaches a terminal status. Writes go through a
/// monotonicity guard: a snapshot whose step counter does not advance past
/// the stored one is refused, so checkpoint progress can never silently move
/// backward. The explicit `rollback` path is the single exception.
use anyhow::{bail, Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use sdk::{KernelError, LedgerSnapshot, Phase};

/// Upsert a snapshot inside an open transaction. With `allow_regression`
/// false the stored step must strictly increase.
pub(crate) async fn write_in(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    snapshot: &LedgerSnapshot,
    allow_regression: bool,
) -> Result<()> {
    if !allow_regression {
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT step FROM ledger_snapshots WHERE objective_id = ?")
                .bind(&snapshot.objective_id)
                .fetch_optional(&mut **tx)
                .await
                .context("Failed to read existing snapshot")?;

        if let Some(stored) = existing {
            if snapshot.step as i64 <= stored {
                bail!(KernelError::Storage(format!(
                    "snapshot step regression for {}: {} -> {}",
                    snapshot.objective_id, stored, snapshot.step
                )));
            }
        }
    }

    let open_questions = serde_json::to_string(&snapshot.open_questions)
        .context("Failed to serialize open questions")?;

    sqlx::query(
        "INSERT OR REPLACE INTO ledger_snapshots \
         (objective_id, format_version, last_completed_phase, memory_cursor, \
          open_questions, next_action_hint, iteration, phase_retries, step, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&snapshot.objective_id)
    .bind(snapshot.format_version as i64)
    .bind(snapshot.last_completed_phase.map(|p| p.as_str()))
    .bind(snapshot.memory_cursor)
    .bind(open_questions)
    .bind(&snapshot.next_action_hint)
    .bind(snapshot.iteration as i64)
    .bind(snapshot.phase_retries as i64)
    .bind(snapshot.step as i64)
    .bind(Utc::now().timestamp_millis())
    .execute(&mut **tx)
    .await
    .context("Failed to write ledger snapshot")?;

    Ok(())
}

/// Continuity ledger repository.
pub struct ContinuityLedger {
    pool: SqlitePool,
}

impl ContinuityLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Overwrite the objective's snapshot. The step counter must advance.
    pub async fn checkpoint(&self, snapshot: &LedgerSnapshot) -> Result<(), KernelError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        write_in(&mut tx, snapshot, false)
            .await
            .map_err(into_kernel)?;
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    /// Write a snapshot that moves the objective backward. Only the explicit
    /// rollback path is allowed to do this.
    pub async fn rollback(&self, snapshot: &LedgerSnapshot) -> Result<(), KernelError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        write_in(&mut tx, snapshot, true)
            .await
            .map_err(into_kernel)?;
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    /// Load the live snapshot for an objective, if one exists. This is the
    /// sole recovery path after a restart.
    pub async fn resume(&self, objective_id: &str) -> Result<Option<LedgerSnapshot>, KernelError> {
        let row = sqlx::query(
            "SELECT objective_id, format_version, last_completed_phase, memory_cursor, \
                    open_questions, next_action_hint, iteration, phase_retries, step \
             FROM ledger_snapshots WHERE objective_id = ?",
        )
        .bind(objective_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.map(from_row).transpose()
    }

    /// Delete the snapshot. Called when the objective reaches a terminal
    /// status.
    pub async fn clear(&self, objective_id: &str) -> Result<(), KernelError> {
        sqlx::query("DELETE FROM ledger_snapshots WHERE objective_id = ?")
            .bind(objective_id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }
}

fn storage(e: sqlx::Error) -> KernelError {
    KernelError::Storage(e.to_string())
}

fn into_kernel(e: anyhow::Error) -> KernelError {
    match e.downcast::<KernelError>() {
        Ok(kernel) => kernel,
        Err(other) => KernelError::Storage(other.to_string()),
    }
}

fn from_row(r: sqlx::sqlite::SqliteRow) -> Result<LedgerSnapshot, KernelError> {
    let phase: Option<String> = r.get("last_completed_phase");
    let open_questions: String = r.get("open_questions");

    Ok(LedgerSnapshot {
        format_version: r.get::<i64, _>("format_version") as u32,
        objective_id: r.get("objective_id"),
        last_completed_phase: match phase {
            Some(text) => Some(
                Phase::parse(&text)
                    .ok_or_else(|| KernelError::Storage(format!("unknown phase '{text}'")))?,
            ),
            None => None,
        },
        memory_cursor: r.get("memory_cursor"),
        open_questions: serde_json::from_str(&open_questions)
            .map_err(|e| KernelError::Storage(format!("corrupt open questions: {e}")))?,
        next_action_hint: r.get("next_action_hint"),
        iteration: r.get::<i64, _>("iteration") as u32,
        phase_retries: r.get::<i64, _>("phase_retries") as u32,
        step: r.get::<i64, _>("step") as u64,
    })
}
