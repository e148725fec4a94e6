//! Instance-log repository — append-only observed events.
//!
//! The aggregate columns on `instances` must equal the sums over these rows
//! (the metrics round-trip law); [`InstanceLogRepo::sum_deltas`] exists so
//! tests and audits can check it.

use rusqlite::{Connection, params};

use crate::errors::Result;
use crate::row_types::{InstanceLogKind, InstanceLogRow};

/// Summed deltas over an instance's log.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DeltaSums {
    /// Total of `tokens_delta`.
    pub tokens: i64,
    /// Total of `cost_delta_usd`.
    pub cost_usd: f64,
}

/// Instance-log repository.
pub struct InstanceLogRepo;

impl InstanceLogRepo {
    /// Append one observed event.
    pub fn append(
        conn: &Connection,
        instance_id: &str,
        kind: InstanceLogKind,
        payload: Option<&str>,
        tokens_delta: i64,
        cost_delta_usd: f64,
    ) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO instance_logs
                 (instance_id, timestamp, kind, payload, tokens_delta, cost_delta_usd)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![instance_id, now, kind.as_str(), payload, tokens_delta, cost_delta_usd],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List an instance's events in observation order.
    pub fn list(conn: &Connection, instance_id: &str, limit: i64) -> Result<Vec<InstanceLogRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, instance_id, timestamp, kind, payload, tokens_delta, cost_delta_usd
             FROM instance_logs WHERE instance_id = ?1
             ORDER BY timestamp ASC, id ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![instance_id, limit], |row| {
                let kind: String = row.get(3)?;
                Ok(InstanceLogRow {
                    id: row.get(0)?,
                    instance_id: row.get(1)?,
                    timestamp: row.get(2)?,
                    kind: InstanceLogKind::parse(&kind),
                    payload: row.get(4)?,
                    tokens_delta: row.get(5)?,
                    cost_delta_usd: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Sum token and cost deltas over an instance's log.
    pub fn sum_deltas(conn: &Connection, instance_id: &str) -> Result<DeltaSums> {
        let sums = conn.query_row(
            "SELECT COALESCE(SUM(tokens_delta), 0), COALESCE(SUM(cost_delta_usd), 0.0)
             FROM instance_logs WHERE instance_id = ?1",
            params![instance_id],
            |row| {
                Ok(DeltaSums {
                    tokens: row.get(0)?,
                    cost_usd: row.get(1)?,
                })
            },
        )?;
        Ok(sums)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
