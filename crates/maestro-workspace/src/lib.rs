//! # maestro-workspace
//!
//! Filesystem workspaces for agent turns and instances.
//!
//! A **shared** workspace is one shallow clone used by every agent of an
//! execution. **Isolated** workspaces give each agent its own clone under a
//! single parent temp directory named `orchestration_isolated_<execution_id>`
//! — that prefix is the sole admission criterion for the read-only temp
//! workspace browse endpoints, and cleanup removes the whole parent on every
//! exit path.

#![deny(unsafe_code)]

pub mod git;
pub mod provisioner;
pub mod ssh;

pub use provisioner::{
    ISOLATED_PREFIX, IsolatedWorkspaces, SharedWorkspace, WorkspaceProvisioner,
    is_admissible_workspace_path,
};
pub use ssh::SshKeyMaterial;
