//! Design repository — versioned design persistence.
//!
//! Designs are validated before they are written (write-time cycle
//! rejection), so every stored definition is executable.

use maestro_core::Design;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::errors::{Result, StoreError};
use crate::row_types::DesignRow;

/// Design repository.
pub struct DesignRepo;

impl DesignRepo {
    /// Persist a new design. The design must already be validated.
    pub fn create(conn: &Connection, name: Option<&str>, design: &Design) -> Result<DesignRow> {
        let id = format!("des_{}", Uuid::now_v7());
        let now = chrono::Utc::now().to_rfc3339();
        let definition = serde_json::to_string(design)?;

        let _ = conn.execute(
            "INSERT INTO designs (id, name, version, definition, created_at, updated_at)
             VALUES (?1, ?2, 1, ?3, ?4, ?4)",
            params![id, name, definition, now],
        )?;

        Ok(DesignRow {
            id,
            name: name.map(String::from),
            version: 1,
            definition,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a design row by id.
    pub fn get(conn: &Connection, design_id: &str) -> Result<Option<DesignRow>> {
        let row = conn
            .query_row(
                "SELECT id, name, version, definition, created_at, updated_at
                 FROM designs WHERE id = ?1",
                params![design_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Get and deserialize a design definition by id.
    pub fn get_definition(conn: &Connection, design_id: &str) -> Result<Design> {
        let row = Self::get(conn, design_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "design",
            id: design_id.to_owned(),
        })?;
        Ok(serde_json::from_str(&row.definition)?)
    }

    /// Replace a design's definition, bumping its version.
    pub fn update(conn: &Connection, design_id: &str, design: &Design) -> Result<DesignRow> {
        let now = chrono::Utc::now().to_rfc3339();
        let definition = serde_json::to_string(design)?;
        let changed = conn.execute(
            "UPDATE designs SET definition = ?1, version = version + 1, updated_at = ?2
             WHERE id = ?3",
            params![definition, now, design_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "design",
                id: design_id.to_owned(),
            });
        }
        Self::get(conn, design_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "design",
            id: design_id.to_owned(),
        })
    }

    /// List all designs, most recently updated first.
    pub fn list(conn: &Connection) -> Result<Vec<DesignRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, version, definition, created_at, updated_at
             FROM designs ORDER BY updated_at DESC",
        )?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete a design. Fails on foreign-key violation if deployments remain.
    pub fn delete(conn: &Connection, design_id: &str) -> Result<bool> {
        let changed = conn.execute("DELETE FROM designs WHERE id = ?1", params![design_id])?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DesignRow> {
        Ok(DesignRow {
            id: row.get(0)?,
            name: row.get(1)?,
            version: row.get(2)?,
            definition: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
