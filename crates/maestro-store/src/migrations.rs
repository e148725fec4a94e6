//! Schema migrations tracked via `PRAGMA user_version`.
//!
//! Each migration is an idempotent batch; `run_migrations` applies every
//! batch with a version above the connection's current `user_version`.

use rusqlite::Connection;
use tracing::info;

use crate::errors::Result;

/// Ordered migration batches. Index + 1 is the schema version.
const MIGRATIONS: &[&str] = &[
    // v1 — initial schema
    "
    CREATE TABLE IF NOT EXISTS designs (
        id              TEXT PRIMARY KEY,
        name            TEXT,
        version         INTEGER NOT NULL DEFAULT 1,
        definition      TEXT NOT NULL,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS deployments (
        id                TEXT PRIMARY KEY,
        design_id         TEXT NOT NULL REFERENCES designs(id),
        endpoint_path     TEXT NOT NULL UNIQUE,
        status            TEXT NOT NULL DEFAULT 'active',
        schedule          TEXT,
        execution_count   INTEGER NOT NULL DEFAULT 0,
        last_execution_at TEXT,
        created_at        TEXT NOT NULL,
        updated_at        TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS execution_logs (
        id            TEXT PRIMARY KEY,
        deployment_id TEXT NOT NULL,
        execution_id  TEXT NOT NULL,
        trigger_kind  TEXT NOT NULL,
        status        TEXT NOT NULL,
        input_json    TEXT,
        result_json   TEXT,
        started_at    TEXT NOT NULL,
        completed_at  TEXT,
        duration_ms   INTEGER,
        error         TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_execution_logs_deployment
        ON execution_logs(deployment_id, started_at DESC);

    CREATE TABLE IF NOT EXISTS instances (
        id              TEXT PRIMARY KEY,
        workflow_id     TEXT NOT NULL,
        user_id         TEXT NOT NULL,
        status          TEXT NOT NULL,
        workspace_path  TEXT,
        total_tokens    INTEGER NOT NULL DEFAULT 0,
        total_cost_usd  REAL NOT NULL DEFAULT 0,
        tool_call_count INTEGER NOT NULL DEFAULT 0,
        running_ms      INTEGER NOT NULL DEFAULT 0,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_instances_workflow
        ON instances(workflow_id, status);

    CREATE TABLE IF NOT EXISTS instance_logs (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        instance_id    TEXT NOT NULL,
        timestamp      TEXT NOT NULL,
        kind           TEXT NOT NULL,
        payload        TEXT,
        tokens_delta   INTEGER NOT NULL DEFAULT 0,
        cost_delta_usd REAL NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_instance_logs_instance
        ON instance_logs(instance_id, timestamp ASC);

    CREATE TABLE IF NOT EXISTS user_credentials (
        user_id          TEXT PRIMARY KEY,
        api_key          TEXT,
        api_key_active   INTEGER NOT NULL DEFAULT 0,
        profile_blob     TEXT,
        profile_selected INTEGER NOT NULL DEFAULT 0,
        updated_at       TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS ssh_keys (
        user_id     TEXT NOT NULL,
        key_name    TEXT NOT NULL,
        private_key TEXT NOT NULL,
        public_key  TEXT NOT NULL,
        created_at  TEXT NOT NULL,
        PRIMARY KEY (user_id, key_name)
    );
    ",
];

/// Apply all pending migrations on the given connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let target = MIGRATIONS.len() as i64;

    for (i, batch) in MIGRATIONS.iter().enumerate() {
        let version = i as i64 + 1;
        if version <= current {
            continue;
        }
        conn.execute_batch(batch)?;
        conn.pragma_update(None, "user_version", version)?;
        info!(version, "applied schema migration");
    }

    debug_assert!(target >= current);
    Ok(())
}

/// Current schema version of a connection.
pub fn schema_version(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
