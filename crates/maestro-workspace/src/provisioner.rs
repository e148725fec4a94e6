//! Workspace provisioning and cleanup.
//!
//! Isolated workspaces all live under one parent directory per execution:
//! `<temp_root>/orchestration_isolated_<execution_id>/<sanitized_agent_name>`.
//! The parent-name prefix is the admission criterion for the read-only
//! browse endpoints, and removing the parent is the whole cleanup story.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use maestro_core::MaestroError;
use maestro_core::design::sanitize_agent_name;
use maestro_core::ids::ExecutionId;
use tracing::{debug, instrument, warn};

use crate::git;
use crate::ssh::{self, SshKeyMaterial};

/// Parent directory prefix for isolated workspaces.
pub const ISOLATED_PREFIX: &str = "orchestration_isolated_";

/// Directory prefix for shared workspaces.
const SHARED_PREFIX: &str = "orchestration_shared_";

/// Directory prefix for per-execution SSH material.
const SSH_PREFIX: &str = "orchestration_ssh_";

/// One shallow clone shared by every agent of an execution.
#[derive(Clone, Debug)]
pub struct SharedWorkspace {
    /// Absolute workspace path.
    pub path: PathBuf,
}

/// Per-agent clones under a single parent.
#[derive(Clone, Debug)]
pub struct IsolatedWorkspaces {
    /// The `orchestration_isolated_<execution_id>` parent.
    pub parent: PathBuf,
    /// Absolute clone path per agent name (insertion by sanitized subdir).
    pub agent_paths: BTreeMap<String, PathBuf>,
}

/// Creates and destroys execution workspaces under a temp root.
#[derive(Clone, Debug)]
pub struct WorkspaceProvisioner {
    temp_root: PathBuf,
}

impl WorkspaceProvisioner {
    /// Provisioner rooted at `temp_root`.
    #[must_use]
    pub fn new(temp_root: PathBuf) -> Self {
        Self { temp_root }
    }

    /// Provisioner rooted at the system temp directory.
    #[must_use]
    pub fn system() -> Self {
        Self::new(std::env::temp_dir())
    }

    /// The temp root this provisioner works under.
    #[must_use]
    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// The isolated-parent directory for an execution.
    #[must_use]
    pub fn isolated_parent(&self, execution_id: &ExecutionId) -> PathBuf {
        self.temp_root.join(format!("{ISOLATED_PREFIX}{execution_id}"))
    }

    fn shared_dir(&self, execution_id: &ExecutionId) -> PathBuf {
        self.temp_root.join(format!("{SHARED_PREFIX}{execution_id}"))
    }

    fn ssh_dir(&self, execution_id: &ExecutionId) -> PathBuf {
        self.temp_root.join(format!("{SSH_PREFIX}{execution_id}"))
    }

    /// Provision one shared workspace for the whole execution.
    #[instrument(skip_all, fields(execution_id = %execution_id))]
    pub async fn provision_shared(
        &self,
        git_repo: Option<&str>,
        branch: Option<&str>,
        execution_id: &ExecutionId,
        keys: &[SshKeyMaterial],
    ) -> Result<SharedWorkspace, MaestroError> {
        let path = self.shared_dir(execution_id);
        if let Some(repo) = git_repo {
            let ssh_env = ssh::materialize(&self.ssh_dir(execution_id), keys).await?;
            git::clone_shallow(repo, branch, &path, ssh_env.as_ref().map(|e| e.ssh_command.as_str()))
                .await?;
        } else {
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| MaestroError::WorkspaceProvisionFailed(format!("mkdir: {e}")))?;
        }
        debug!(path = %path.display(), "shared workspace ready");
        Ok(SharedWorkspace { path })
    }

    /// Provision one clone per agent under the isolated parent.
    ///
    /// Sanitized-name uniqueness is a design-validation invariant; runtime
    /// provisioning assumes it.
    #[instrument(skip_all, fields(execution_id = %execution_id, agents = agent_names.len()))]
    pub async fn provision_isolated(
        &self,
        git_repo: Option<&str>,
        branch: Option<&str>,
        execution_id: &ExecutionId,
        agent_names: &[String],
        keys: &[SshKeyMaterial],
    ) -> Result<IsolatedWorkspaces, MaestroError> {
        let parent = self.isolated_parent(execution_id);
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| MaestroError::WorkspaceProvisionFailed(format!("mkdir: {e}")))?;

        let ssh_env = match git_repo {
            Some(_) => ssh::materialize(&self.ssh_dir(execution_id), keys).await?,
            None => None,
        };
        let ssh_command = ssh_env.as_ref().map(|e| e.ssh_command.as_str());

        let mut agent_paths = BTreeMap::new();
        for name in agent_names {
            let subdir = parent.join(sanitize_agent_name(name));
            if let Some(repo) = git_repo {
                git::clone_shallow(repo, branch, &subdir, ssh_command).await?;
            } else {
                tokio::fs::create_dir_all(&subdir)
                    .await
                    .map_err(|e| MaestroError::WorkspaceProvisionFailed(format!("mkdir: {e}")))?;
            }
            let _ = agent_paths.insert(name.clone(), subdir);
        }

        debug!(parent = %parent.display(), "isolated workspaces ready");
        Ok(IsolatedWorkspaces { parent, agent_paths })
    }

    /// Remove everything provisioned for an execution.
    ///
    /// Idempotent: missing directories are not an error, and partial removal
    /// failures are logged rather than propagated.
    #[instrument(skip_all, fields(execution_id = %execution_id))]
    pub async fn cleanup(&self, execution_id: &ExecutionId) {
        for dir in [
            self.isolated_parent(execution_id),
            self.shared_dir(execution_id),
            self.ssh_dir(execution_id),
        ] {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => debug!(dir = %dir.display(), "removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(dir = %dir.display(), error = %e, "cleanup failed"),
            }
        }
    }
}

/// Whether `candidate` is admissible for the temp-workspace read endpoints:
/// under `temp_root`, inside a directory carrying the isolated prefix, and
/// free of `..` components.
#[must_use]
pub fn is_admissible_workspace_path(temp_root: &Path, candidate: &Path) -> bool {
    if !candidate.is_absolute() {
        return false;
    }
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return false;
    }
    let Ok(relative) = candidate.strip_prefix(temp_root) else {
        return false;
    };
    let Some(Component::Normal(first)) = relative.components().next() else {
        return false;
    };
    first
        .to_str()
        .is_some_and(|s| s.starts_with(ISOLATED_PREFIX))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
