/// Objective persistence operations
///
/// One row per submitted unit of work. Rows are mutated only by the cycle
/// controller (status, assignment, closure) and are archived in place when a
/// terminal status is reached: the row stays, the ledger snapshot goes.
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Objective lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveStatus {
    Queued,
    Routing,
    Active,
    Blocked,
    Done,
    Failed,
}

impl ObjectiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectiveStatus::Queued => "queued",
            ObjectiveStatus::Routing => "routing",
            ObjectiveStatus::Active => "active",
            ObjectiveStatus::Blocked => "blocked",
            ObjectiveStatus::Done => "done",
            ObjectiveStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<ObjectiveStatus> {
        match s {
            "queued" => Some(ObjectiveStatus::Queued),
            "routing" => Some(ObjectiveStatus::Routing),
            "active" => Some(ObjectiveStatus::Active),
            "blocked" => Some(ObjectiveStatus::Blocked),
            "done" => Some(ObjectiveStatus::Done),
            "failed" => Some(ObjectiveStatus::Failed),
            _ => None,
        }
    }

    /// DONE and FAILED end the objective's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ObjectiveStatus::Done | ObjectiveStatus::Failed)
    }
}

/// Objective record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objective {
    pub id: String,
    pub description: String,
    pub priority: i64,
    pub status: ObjectiveStatus,
    pub assigned_handler: Option<String>,
    pub created_at: i64,
    pub closed_at: Option<i64>,
}

/// Objective repository for database operations
pub struct ObjectiveRepository {
    pool: SqlitePool,
}

impl ObjectiveRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new objective in QUEUED status.
    pub async fn create(&self, id: &str, description: &str, priority: i64) -> Result<Objective> {
        let now = Utc::now().timestamp_millis();

        sqlx::query(
            "INSERT INTO objectives (id, description, priority, status, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(description)
        .bind(priority)
        .bind(ObjectiveStatus::Queued.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create objective")?;

        Ok(Objective {
            id: id.to_string(),
            description: description.to_string(),
            priority,
            status: ObjectiveStatus::Queued,
            assigned_handler: None,
            created_at: now,
            closed_at: None,
        })
    }

    /// Update objective status.
    pub async fn set_status(&self, id: &str, status: ObjectiveStatus) -> Result<()> {
        sqlx::query("UPDATE objectives SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update objective status")?;

        Ok(())
    }

    /// Assign a handler and mark the objective ACTIVE. Reassignment is only
    /// legal from ROUTING, which is the sole caller of this method.
    pub async fn assign(&self, id: &str, handler: &str) -> Result<()> {
        sqlx::query("UPDATE objectives SET assigned_handler = ?, status = ? WHERE id = ?")
            .bind(handler)
            .bind(ObjectiveStatus::Active.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to assign objective handler")?;

        Ok(())
    }

    /// Move the objective to a terminal status and stamp closed_at.
    pub async fn close(&self, id: &str, status: ObjectiveStatus) -> Result<()> {
        let now = Utc::now().timestamp_millis();

        sqlx::query("UPDATE objectives SET status = ?, closed_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to close objective")?;

        Ok(())
    }

    /// Get an objective by ID.
    pub async fn get(&self, id: &str) -> Result<Option<Objective>> {
        let row = sqlx::query(
            "SELECT id, description, priority, status, assigned_handler, created_at, closed_at \
             FROM objectives WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch objective")?;

        Ok(row.map(Self::from_row))
    }

    /// Get recent objectives, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<Objective>> {
        let rows = sqlx::query(
            "SELECT id, description, priority, status, assigned_handler, created_at, closed_at \
             FROM objectives ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent objectives")?;

        Ok(rows.into_iter().map(Self::from_row).collect())
    }

    fn from_row(r: sqlx::sqlite::SqliteRow) -> Objective {
        Objective {
            id: r.get("id"),
            description: r.get("description"),
            priority: r.get("priority"),
            status: ObjectiveStatus::parse(&r.get::<String, _>("status"))
                .unwrap_or(ObjectiveStatus::Failed),
            assigned_handler: r.get("assigned_handler"),
            created_at: r.get("created_at"),
            closed_at: r.get("closed_at"),
        }
    }
}
