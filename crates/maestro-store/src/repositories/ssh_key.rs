//! SSH key repository — persisted key pairs materialized per clone.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::row_types::SshKeyRow;

/// SSH key repository.
pub struct SshKeyRepo;

impl SshKeyRepo {
    /// Upsert a key pair for a user.
    pub fn put(
        conn: &Connection,
        user_id: &str,
        key_name: &str,
        private_key: &str,
        public_key: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO ssh_keys (user_id, key_name, private_key, public_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, key_name) DO UPDATE SET
                 private_key = excluded.private_key,
                 public_key = excluded.public_key",
            params![user_id, key_name, private_key, public_key, now],
        )?;
        Ok(())
    }

    /// Get one key pair.
    pub fn get(conn: &Connection, user_id: &str, key_name: &str) -> Result<Option<SshKeyRow>> {
        let row = conn
            .query_row(
                "SELECT user_id, key_name, private_key, public_key, created_at
                 FROM ssh_keys WHERE user_id = ?1 AND key_name = ?2",
                params![user_id, key_name],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List a user's key pairs.
    pub fn list_for_user(conn: &Connection, user_id: &str) -> Result<Vec<SshKeyRow>> {
        let mut stmt = conn.prepare(
            "SELECT user_id, key_name, private_key, public_key, created_at
             FROM ssh_keys WHERE user_id = ?1 ORDER BY key_name ASC",
        )?;
        let rows = stmt
            .query_map(params![user_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete one key pair. Returns whether a row was removed.
    pub fn delete(conn: &Connection, user_id: &str, key_name: &str) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM ssh_keys WHERE user_id = ?1 AND key_name = ?2",
            params![user_id, key_name],
        )?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SshKeyRow> {
        Ok(SshKeyRow {
            user_id: row.get(0)?,
            key_name: row.get(1)?,
            private_key: row.get(2)?,
            public_key: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn put_get_roundtrip() {
        let conn = conn();
        SshKeyRepo::put(&conn, "u1", "deploy", "PRIVATE", "ssh-ed25519 AAAA").unwrap();
        let row = SshKeyRepo::get(&conn, "u1", "deploy").unwrap().unwrap();
        assert_eq!(row.private_key, "PRIVATE");
        assert_eq!(row.public_key, "ssh-ed25519 AAAA");
    }

    #[test]
    fn put_overwrites() {
        let conn = conn();
        SshKeyRepo::put(&conn, "u1", "deploy", "OLD", "pub-old").unwrap();
        SshKeyRepo::put(&conn, "u1", "deploy", "NEW", "pub-new").unwrap();
        let row = SshKeyRepo::get(&conn, "u1", "deploy").unwrap().unwrap();
        assert_eq!(row.private_key, "NEW");
        assert_eq!(SshKeyRepo::list_for_user(&conn, "u1").unwrap().len(), 1);
    }

    #[test]
    fn list_scoped_to_user() {
        let conn = conn();
        SshKeyRepo::put(&conn, "u1", "a", "k", "p").unwrap();
        SshKeyRepo::put(&conn, "u2", "b", "k", "p").unwrap();
        assert_eq!(SshKeyRepo::list_for_user(&conn, "u1").unwrap().len(), 1);
    }

    #[test]
    fn delete_returns_whether_found() {
        let conn = conn();
        SshKeyRepo::put(&conn, "u1", "a", "k", "p").unwrap();
        assert!(SshKeyRepo::delete(&conn, "u1", "a").unwrap());
        assert!(!SshKeyRepo::delete(&conn, "u1", "a").unwrap());
    }
}
