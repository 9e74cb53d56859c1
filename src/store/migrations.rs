//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `init_schema()` checks the
//! current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS campaigns (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            search_query TEXT,
            pipeline_id TEXT,
            job_spec TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS candidates (
            id TEXT PRIMARY KEY,
            campaign_id TEXT NOT NULL,
            external_id TEXT NOT NULL,
            name TEXT NOT NULL,
            location TEXT,
            current_company TEXT,
            current_title TEXT,
            positions TEXT NOT NULL DEFAULT '[]',
            certifications TEXT NOT NULL DEFAULT '[]',
            pipeline_status TEXT NOT NULL DEFAULT 'identified',
            total_score REAL,
            bucket TEXT,
            hard_filter_passed INTEGER,
            disqualify_reason TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(campaign_id, external_id)
        );
        CREATE INDEX IF NOT EXISTS idx_candidates_status
            ON candidates(pipeline_status);
        CREATE INDEX IF NOT EXISTS idx_candidates_campaign
            ON candidates(campaign_id);

        CREATE TABLE IF NOT EXISTS pipelines (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pipeline_stages (
            id TEXT PRIMARY KEY,
            pipeline_id TEXT NOT NULL,
            stage_order INTEGER NOT NULL,
            action_type TEXT NOT NULL,
            delay_days INTEGER NOT NULL DEFAULT 0,
            requires_approval INTEGER NOT NULL DEFAULT 1,
            template TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_stages_pipeline
            ON pipeline_stages(pipeline_id, stage_order);

        CREATE TABLE IF NOT EXISTS candidate_pipeline_progress (
            id TEXT PRIMARY KEY,
            candidate_id TEXT NOT NULL,
            pipeline_stage_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            started_at TEXT,
            completed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_progress_candidate
            ON candidate_pipeline_progress(candidate_id);
        CREATE INDEX IF NOT EXISTS idx_progress_status
            ON candidate_pipeline_progress(status);

        CREATE TABLE IF NOT EXISTS approval_queue (
            id TEXT PRIMARY KEY,
            candidate_id TEXT NOT NULL,
            campaign_id TEXT NOT NULL,
            approval_type TEXT NOT NULL,
            proposed_text TEXT NOT NULL,
            approved_text TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            responded_at TEXT,
            sent_at TEXT,
            failed_reason TEXT,
            pipeline_stage_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_approvals_status
            ON approval_queue(status);
        CREATE INDEX IF NOT EXISTS idx_approvals_candidate
            ON approval_queue(candidate_id);

        CREATE TABLE IF NOT EXISTS agent_actions (
            id TEXT PRIMARY KEY,
            candidate_id TEXT NOT NULL,
            action_type TEXT NOT NULL,
            success INTEGER NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_actions_candidate
            ON agent_actions(candidate_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_actions_type
            ON agent_actions(action_type);

        CREATE TABLE IF NOT EXISTS daily_action_counts (
            day TEXT NOT NULL,
            action_type TEXT NOT NULL,
            count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (day, action_type)
        );
    "#,
}];

/// Apply all migrations newer than the recorded version.
pub async fn init_schema(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("create _migrations: {e}")))?;

    let current = current_version(conn).await?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.sql)
            .await
            .map_err(|e| {
                DatabaseError::Migration(format!("apply {} ({}): {e}", migration.version, migration.name))
            })?;

        conn.execute(
            "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            libsql::params![
                migration.version,
                migration.name,
                chrono::Utc::now().to_rfc3339()
            ],
        )
        .await
        .map_err(|e| DatabaseError::Migration(format!("record {}: {e}", migration.version)))?;

        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applied migration"
        );
    }

    Ok(())
}

async fn current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("read version: {e}")))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0)),
        Ok(None) => Ok(0),
        Err(e) => Err(DatabaseError::Migration(format!("read version: {e}"))),
    }
}
