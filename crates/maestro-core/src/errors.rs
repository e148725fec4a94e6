//! Error hierarchy for the Maestro control plane.
//!
//! [`MaestroError`] is the top-level enum covering all error domains. Each
//! variant maps to one of the textual boundary kinds exposed to the REST/WS
//! layer (`DesignCyclic`, `CredentialUnavailable`, `AgentFailed`, ...) via
//! [`MaestroError::kind`]. Variants carry domain-specific context so the
//! enclosing executor can log and report without re-parsing messages.

use thiserror::Error;

/// Top-level error type for the Maestro control plane.
#[derive(Debug, Error)]
pub enum MaestroError {
    /// A design failed acceptance-time or execute-time validation.
    #[error("invalid design: {0}")]
    Validation(String),

    /// The block graph of a design contains a cycle.
    #[error("design contains a cycle involving block {block_id}")]
    DesignCyclic {
        /// A block on the detected cycle.
        block_id: String,
    },

    /// No usable credentials for the invoking user.
    #[error("no credentials available for user {user_id}: {reason}")]
    CredentialUnavailable {
        /// The invoking user.
        user_id: String,
        /// Why resolution failed.
        reason: String,
    },

    /// An agent turn terminated without producing assistant text.
    #[error("agent {agent_name} failed (exit {exit_code}): {stderr_tail}")]
    AgentFailed {
        /// Name of the failing agent.
        agent_name: String,
        /// Subprocess exit code.
        exit_code: i32,
        /// Tail of the subprocess stderr for diagnosis.
        stderr_tail: String,
    },

    /// The routing agent failed to produce parseable JSON twice.
    #[error("router {agent_name} did not produce a parseable decision")]
    RoutingUndecided {
        /// Name of the router agent.
        agent_name: String,
    },

    /// Workspace provisioning (temp dir, clone, SSH keys) failed.
    #[error("workspace provisioning failed: {0}")]
    WorkspaceProvisionFailed(String),

    /// A per-turn subprocess exceeded its wall-clock timeout.
    #[error("subprocess exceeded {timeout_secs}s wall-clock timeout")]
    SubprocessTimeout {
        /// The configured timeout that was exceeded.
        timeout_secs: u64,
    },

    /// A deployment endpoint path is already taken or the target is inactive.
    #[error("endpoint conflict on {path}: {reason}")]
    EndpointConflict {
        /// The conflicting endpoint path.
        path: String,
        /// Why the operation conflicts.
        reason: String,
    },

    /// No active deployment is bound to the requested path.
    #[error("no deployment bound to endpoint {path}")]
    EndpointNotFound {
        /// The requested endpoint path.
        path: String,
    },

    /// The execution was cancelled by the caller.
    #[error("execution cancelled")]
    Cancelled,

    /// A schedule expression failed to parse.
    #[error("invalid schedule: {0}")]
    ScheduleInvalid(String),

    /// Instance lifecycle failure (spawn, send, interrupt, stop).
    #[error("instance {instance_id} {operation} failed: {message}")]
    Instance {
        /// The instance.
        instance_id: String,
        /// Operation that failed.
        operation: String,
        /// Human-readable message.
        message: String,
    },

    /// Datastore failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O failure outside the domains above.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MaestroError {
    /// The textual error kind exposed at the core boundary.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation",
            Self::DesignCyclic { .. } => "DesignCyclic",
            Self::CredentialUnavailable { .. } => "CredentialUnavailable",
            Self::AgentFailed { .. } => "AgentFailed",
            Self::RoutingUndecided { .. } => "RoutingUndecided",
            Self::WorkspaceProvisionFailed(_) => "WorkspaceProvisionFailed",
            Self::SubprocessTimeout { .. } => "SubprocessTimeout",
            Self::EndpointConflict { .. } => "EndpointConflict",
            Self::EndpointNotFound { .. } => "EndpointNotFound",
            Self::Cancelled => "Cancelled",
            Self::ScheduleInvalid(_) => "ScheduleInvalid",
            Self::Instance { .. } => "InstanceError",
            Self::Storage(_) => "StorageError",
            Self::Io(_) => "IoError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Whether this error is a caller error (no execution was started).
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::DesignCyclic { .. }
                | Self::ScheduleInvalid(_)
                | Self::EndpointConflict { .. }
                | Self::EndpointNotFound { .. }
        )
    }

    /// Whether this error is an environment precondition failure (reported
    /// before any agent turn; not recorded in the execution log).
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::CredentialUnavailable { .. } | Self::WorkspaceProvisionFailed(_)
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
