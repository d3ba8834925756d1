/// Database module for SQLite persistence
///
/// This module provides database operations for objectives, the append-only
/// memory store, and the continuity ledger. It uses sqlx with parameterized
/// queries and WAL mode for better concurrency.
///
/// The one cross-repository operation lives here: `commit_phase`, which
/// appends a memory entry and overwrites the objective's ledger snapshot in a
/// single transaction, so a reader can never observe a snapshot pointing past
/// committed memory.
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use sdk::{KernelError, LedgerSnapshot};

pub mod ledger;
pub mod memory;
pub mod objectives;

// Re-export commonly used types
pub use ledger::ContinuityLedger;
pub use memory::{MemoryEntry, MemoryStore};
pub use objectives::{Objective, ObjectiveRepository, ObjectiveStatus};

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if needed, enables WAL mode, and runs the
    /// schema migrations. WAL mode also gives automatic recovery from an
    /// unclean shutdown when the database is reopened.
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!("Initializing database at: {}", db_path.display());

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let connection_string = format!("sqlite:{}", db_path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        debug!("Database connection established");

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    ///
    /// Migrations are idempotent and can be run multiple times safely.
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::raw_sql(include_str!("../../migrations/001_initial.sql"))
            .execute(&self.pool)
            .await
            .context("Failed to execute migration 001_initial.sql")?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Flush the WAL to disk
    ///
    /// Called during graceful shutdown so all pending writes reach the main
    /// database file.
    pub async fn flush_wal(&self) -> Result<()> {
        info!("Flushing WAL to disk");

        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to flush WAL")?;

        Ok(())
    }

    /// Close the database connection, flushing the WAL first.
    pub async fn close(self) -> Result<()> {
        info!("Closing database connection");

        self.flush_wal().await?;
        self.pool.close().await;

        Ok(())
    }

    /// Create an objective repository
    pub fn objectives(&self) -> ObjectiveRepository {
        ObjectiveRepository::new(self.pool.clone())
    }

    /// Create a memory store handle
    pub fn memory(&self) -> MemoryStore {
        MemoryStore::new(self.pool.clone())
    }

    /// Create a continuity ledger handle
    pub fn ledger(&self) -> ContinuityLedger {
        ContinuityLedger::new(self.pool.clone())
    }

    /// Atomically append `entry` and overwrite the objective's snapshot.
    ///
    /// The snapshot's `memory_cursor` is set to the sequence number of the
    /// entry committed in the same transaction. Returns that sequence number.
    pub async fn commit_phase(
        &self,
        entry: &MemoryEntry,
        snapshot: &LedgerSnapshot,
    ) -> Result<i64, KernelError> {
        sdk::validate_payload(entry.phase, &entry.payload)
            .map_err(|e| KernelError::Validation(format!("{} payload: {}", entry.phase, e)))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| KernelError::Storage(e.to_string()))?;

        let seq = memory::append_in(&mut tx, entry)
            .await
            .map_err(|e| KernelError::Storage(e.to_string()))?;

        let committed = LedgerSnapshot {
            memory_cursor: seq,
            ..snapshot.clone()
        };
        ledger::write_in(&mut tx, &committed, false)
            .await
            .map_err(|e| match e.downcast::<KernelError>() {
                Ok(kernel) => kernel,
                Err(other) => KernelError::Storage(other.to_string()),
            })?;

        tx.commit()
            .await
            .map_err(|e| KernelError::Storage(e.to_string()))?;

        Ok(seq)
    }
}
