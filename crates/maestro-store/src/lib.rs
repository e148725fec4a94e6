//! # maestro-store
//!
//! `SQLite` persistence for the Maestro control plane.
//!
//! Connection pooling via `r2d2` with WAL-mode pragmas; stateless repository
//! structs whose methods take `&Connection`; migrations tracked through
//! `PRAGMA user_version`. The collections map the control plane's records:
//! designs, deployments, execution logs, instances, instance logs, user
//! credentials, and SSH keys.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod row_types;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory};
pub use errors::{Result, StoreError};
pub use migrations::run_migrations;

/// Create a migrated in-memory pool (test helper used across crates).
///
/// Pool size 1: each in-memory connection is its own database, so the pool
/// must hand out the single migrated connection.
pub fn open_in_memory() -> Result<ConnectionPool> {
    let pool = new_in_memory(&ConnectionConfig {
        pool_size: 1,
        ..ConnectionConfig::default()
    })?;
    {
        let conn = pool.get()?;
        run_migrations(&conn)?;
    }
    Ok(pool)
}
