//! User credential repository.
//!
//! One row per user: an optional API key with an active-default flag, and an
//! optional CLI login profile blob with a selected flag. The Credential
//! Provider reads this on every request; nothing is cached across requests.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::row_types::UserCredentialRow;

/// Credential repository.
pub struct CredentialRepo;

impl CredentialRepo {
    /// Get a user's credential row.
    pub fn get(conn: &Connection, user_id: &str) -> Result<Option<UserCredentialRow>> {
        let row = conn
            .query_row(
                "SELECT user_id, api_key, api_key_active, profile_blob, profile_selected,
                        updated_at
                 FROM user_credentials WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserCredentialRow {
                        user_id: row.get(0)?,
                        api_key: row.get(1)?,
                        api_key_active: row.get::<_, i64>(2)? != 0,
                        profile_blob: row.get(3)?,
                        profile_selected: row.get::<_, i64>(4)? != 0,
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Upsert a user's API key and active flag.
    pub fn set_api_key(
        conn: &Connection,
        user_id: &str,
        api_key: Option<&str>,
        active: bool,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO user_credentials (user_id, api_key, api_key_active, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                 api_key = excluded.api_key,
                 api_key_active = excluded.api_key_active,
                 updated_at = excluded.updated_at",
            params![user_id, api_key, i64::from(active), now],
        )?;
        Ok(())
    }

    /// Upsert a user's CLI login profile blob and selected flag.
    pub fn set_profile(
        conn: &Connection,
        user_id: &str,
        profile_blob: Option<&str>,
        selected: bool,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO user_credentials (user_id, profile_blob, profile_selected, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                 profile_blob = excluded.profile_blob,
                 profile_selected = excluded.profile_selected,
                 updated_at = excluded.updated_at",
            params![user_id, profile_blob, i64::from(selected), now],
        )?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
