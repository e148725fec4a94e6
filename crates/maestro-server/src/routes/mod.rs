//! Route handlers grouped by surface.

pub mod deployed;
pub mod deployments;
pub mod designs;
pub mod instances;
pub mod orchestrate;
pub mod workspaces;

use maestro_engine::ExecuteOptions;
use maestro_store::repositories::SshKeyRepo;
use maestro_workspace::SshKeyMaterial;

use crate::error::ApiError;
use crate::server::AppState;

/// Resolve per-request execute options: credentials refreshed for the
/// invoking user (never cached) and their SSH keys for authenticated clones.
pub(crate) async fn resolve_options(
    state: &AppState,
    user_id: Option<&str>,
) -> Result<ExecuteOptions, ApiError> {
    let mut opts = ExecuteOptions::default();
    if let Some(user_id) = user_id {
        opts.credentials = state.credentials.ensure(user_id).await?;
        let conn = state
            .pool
            .get()
            .map_err(|e| maestro_core::MaestroError::Storage(e.to_string()))?;
        opts.ssh_keys = SshKeyRepo::list_for_user(&conn, user_id)
            .map_err(maestro_core::MaestroError::from)?
            .into_iter()
            .map(|row| SshKeyMaterial {
                name: row.key_name,
                private_key: row.private_key,
                public_key: row.public_key,
            })
            .collect();
    }
    Ok(opts)
}
