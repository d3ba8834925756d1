/// Integration tests for the persistence layer
///
/// Tests the complete database lifecycle including:
/// - Database creation and initialization
/// - WAL mode configuration
/// - Schema creation via migrations
/// - Append-only memory ordering across subjects
/// - Atomic phase commits (entry + snapshot)
use sdk::{LedgerSnapshot, Outcome, Phase};
use serde_json::json;
use tempfile::TempDir;

use cadence_engine::db::{Database, MemoryEntry};

#[tokio::test]
async fn test_database_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("cadence.db");

    let db = Database::new(&db_path).await.unwrap();

    assert!(db_path.exists());

    // WAL file exists once WAL mode is active
    let wal_path = temp_dir.path().join("cadence.db-wal");
    assert!(wal_path.exists());

    let result = sqlx::query("SELECT COUNT(*) FROM objectives")
        .fetch_one(db.pool())
        .await;
    assert!(result.is_ok());

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_database_schema_complete() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("cadence.db"))
        .await
        .unwrap();

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(db.pool())
            .await
            .unwrap();

    assert!(tables.contains(&"objectives".to_string()), "objectives table missing");
    assert!(
        tables.contains(&"memory_entries".to_string()),
        "memory_entries table missing"
    );
    assert!(
        tables.contains(&"ledger_snapshots".to_string()),
        "ledger_snapshots table missing"
    );

    let indexes: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name",
    )
    .fetch_all(db.pool())
    .await
    .unwrap();

    assert!(indexes.contains(&"idx_objectives_status".to_string()));
    assert!(indexes.contains(&"idx_memory_subject_time".to_string()));

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("cadence.db");

    let db = Database::new(&db_path).await.unwrap();
    db.close().await.unwrap();

    // Reopening runs the migrations again; nothing should break
    let db = Database::new(&db_path).await.unwrap();
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_interleaved_appends_stay_individually_ordered() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("cadence.db"))
        .await
        .unwrap();

    let objectives = db.objectives();
    objectives.create("obj-a", "first", 0).await.unwrap();
    objectives.create("obj-b", "second", 0).await.unwrap();

    let store = db.memory();
    for i in 0..5 {
        for subject in ["obj-a", "obj-b"] {
            let entry = MemoryEntry::new(
                subject,
                Phase::Observe,
                json!({"summary": format!("{subject} round {i}"), "facts": []}),
                Outcome::Success,
            );
            store.append(&entry).await.unwrap();
        }
    }

    for subject in ["obj-a", "obj-b"] {
        let entries = store.query(subject, None, None).await.unwrap();
        assert_eq!(entries.len(), 5);

        let mut last = (0i64, 0i64);
        for entry in &entries {
            let key = (entry.timestamp, entry.seq.unwrap());
            assert!(key > last, "entries out of order for {subject}");
            last = key;
            assert_eq!(entry.subject, subject);
        }
    }

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_commit_phase_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("cadence.db");

    {
        let db = Database::new(&db_path).await.unwrap();
        db.objectives().create("obj-1", "persist me", 0).await.unwrap();

        let entry = MemoryEntry::new(
            "obj-1",
            Phase::Orient,
            json!({"assessment": "steady", "open_questions": ["one more step"]}),
            Outcome::Success,
        );
        let mut snapshot = LedgerSnapshot::initial("obj-1");
        snapshot.last_completed_phase = Some(Phase::Orient);
        snapshot.open_questions = vec!["one more step".to_string()];
        snapshot.step = 1;

        db.commit_phase(&entry, &snapshot).await.unwrap();
        db.close().await.unwrap();
    }

    // Fresh connection sees both sides of the commit
    let db = Database::new(&db_path).await.unwrap();

    let entries = db.memory().query("obj-1", None, None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].phase, Phase::Orient);

    let snapshot = db.ledger().resume("obj-1").await.unwrap().unwrap();
    assert_eq!(snapshot.last_completed_phase, Some(Phase::Orient));
    assert_eq!(snapshot.memory_cursor, entries[0].seq.unwrap());
    assert_eq!(snapshot.open_questions, vec!["one more step".to_string()]);

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_snapshot_cursor_never_points_past_memory() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("cadence.db"))
        .await
        .unwrap();

    db.objectives().create("obj-1", "cursor check", 0).await.unwrap();

    let mut step = 0u64;
    for i in 0..4 {
        let entry = MemoryEntry::new(
            "obj-1",
            Phase::Observe,
            json!({"summary": format!("round {i}"), "facts": []}),
            Outcome::Success,
        );
        step += 1;
        let mut snapshot = LedgerSnapshot::initial("obj-1");
        snapshot.last_completed_phase = Some(Phase::Observe);
        snapshot.step = step;

        db.commit_phase(&entry, &snapshot).await.unwrap();

        // After every commit the cursor resolves to a committed entry
        let snapshot = db.ledger().resume("obj-1").await.unwrap().unwrap();
        let trailing = db.memory().query_after("obj-1", snapshot.memory_cursor).await.unwrap();
        assert!(trailing.is_empty(), "cursor points past committed memory");
    }

    db.close().await.unwrap();
}
