//! Typed row structs and status enums mapped from `SQLite` rows.

use serde::{Deserialize, Serialize};

/// Deployment activation state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Dispatchable and schedulable.
    #[default]
    Active,
    /// Not dispatchable; schedule deregistered.
    Inactive,
}

impl DeploymentStatus {
    /// Text form stored in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    /// Parse the stored text form.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s == "inactive" {
            Self::Inactive
        } else {
            Self::Active
        }
    }
}

/// How an execution was triggered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Explicit execute call.
    Manual,
    /// Fired by the scheduler.
    Scheduled,
    /// Dynamic endpoint dispatch.
    Api,
}

impl TriggerKind {
    /// Text form stored in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
            Self::Api => "api",
        }
    }

    /// Parse the stored text form.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "scheduled" => Self::Scheduled,
            "api" => Self::Api,
            _ => Self::Manual,
        }
    }
}

/// Execution-log terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Still executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Terminated with an error.
    Failed,
}

impl ExecutionStatus {
    /// Text form stored in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse the stored text form.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Running,
        }
    }
}

/// Instance lifecycle state.
///
/// Transitions are monotonic within a lifecycle except `ready ↔ running`
/// (and `running → interrupted → ready`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Subprocess forked, awaiting the CLI ready marker.
    Starting,
    /// Idle, accepting input.
    Ready,
    /// Processing input.
    Running,
    /// Interrupt delivered, quiescing.
    Interrupted,
    /// Terminated cleanly; no subprocess remains.
    Stopped,
    /// Terminated on error; no subprocess remains.
    Failed,
}

impl InstanceStatus {
    /// Text form stored in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Interrupted => "interrupted",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    /// Parse the stored text form.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "ready" => Self::Ready,
            "running" => Self::Running,
            "interrupted" => Self::Interrupted,
            "stopped" => Self::Stopped,
            "failed" => Self::Failed,
            _ => Self::Starting,
        }
    }

    /// Whether the instance owns a live subprocess in this state.
    #[must_use]
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Stopped | Self::Failed)
    }
}

/// Kind of an observed instance event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceLogKind {
    /// Plain assistant/terminal output.
    Stdout,
    /// Tool invocation observed.
    ToolCall,
    /// Tool result observed.
    ToolResult,
    /// Token/cost usage report.
    Cost,
    /// Error output.
    Error,
    /// Manager-originated note (parse warnings, drop notices).
    System,
}

impl InstanceLogKind {
    /// Text form stored in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::Cost => "cost",
            Self::Error => "error",
            Self::System => "system",
        }
    }

    /// Parse the stored text form.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "tool_call" => Self::ToolCall,
            "tool_result" => Self::ToolResult,
            "cost" => Self::Cost,
            "error" => Self::Error,
            "system" => Self::System,
            _ => Self::Stdout,
        }
    }
}

/// A persisted design row.
#[derive(Clone, Debug)]
pub struct DesignRow {
    /// Design id.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Monotonic version, bumped on update.
    pub version: i64,
    /// JSON-serialized [`maestro_core::Design`].
    pub definition: String,
    /// RFC3339 creation time.
    pub created_at: String,
    /// RFC3339 last update time.
    pub updated_at: String,
}

/// A persisted deployment row.
#[derive(Clone, Debug)]
pub struct DeploymentRow {
    /// Deployment id.
    pub id: String,
    /// Bound design.
    pub design_id: String,
    /// Unique dispatch path (leading `/`, restricted charset).
    pub endpoint_path: String,
    /// Activation state.
    pub status: DeploymentStatus,
    /// JSON-serialized schedule, if any.
    pub schedule: Option<String>,
    /// Number of recorded executions.
    pub execution_count: i64,
    /// RFC3339 time of the last execution.
    pub last_execution_at: Option<String>,
    /// RFC3339 creation time.
    pub created_at: String,
    /// RFC3339 last update time.
    pub updated_at: String,
}

/// One run of a deployment.
#[derive(Clone, Debug)]
pub struct ExecutionLogRow {
    /// Log id.
    pub id: String,
    /// Owning deployment.
    pub deployment_id: String,
    /// Engine execution id.
    pub execution_id: String,
    /// How the run was triggered.
    pub trigger: TriggerKind,
    /// Terminal state.
    pub status: ExecutionStatus,
    /// JSON input.
    pub input_json: Option<String>,
    /// JSON result.
    pub result_json: Option<String>,
    /// RFC3339 start time.
    pub started_at: String,
    /// RFC3339 completion time.
    pub completed_at: Option<String>,
    /// Wall-clock duration.
    pub duration_ms: Option<i64>,
    /// Failure message, if failed.
    pub error: Option<String>,
}

/// A live (or finished) CLI instance row.
#[derive(Clone, Debug)]
pub struct InstanceRow {
    /// Instance id.
    pub id: String,
    /// Owning workflow.
    pub workflow_id: String,
    /// Owning user.
    pub user_id: String,
    /// Lifecycle state.
    pub status: InstanceStatus,
    /// Shared workspace path.
    pub workspace_path: Option<String>,
    /// Aggregated tokens (input + output + cache).
    pub total_tokens: i64,
    /// Aggregated cost.
    pub total_cost_usd: f64,
    /// Aggregated tool-call count.
    pub tool_call_count: i64,
    /// Accumulated running wall time.
    pub running_ms: i64,
    /// RFC3339 creation time.
    pub created_at: String,
    /// RFC3339 last update time.
    pub updated_at: String,
}

/// One observed instance event.
#[derive(Clone, Debug)]
pub struct InstanceLogRow {
    /// Rowid.
    pub id: i64,
    /// Owning instance.
    pub instance_id: String,
    /// RFC3339 observation time.
    pub timestamp: String,
    /// Event kind.
    pub kind: InstanceLogKind,
    /// Event payload (full, untruncated).
    pub payload: Option<String>,
    /// Tokens added by this event.
    pub tokens_delta: i64,
    /// Cost added by this event.
    pub cost_delta_usd: f64,
}

/// Stored credentials for one user.
#[derive(Clone, Debug)]
pub struct UserCredentialRow {
    /// The user.
    pub user_id: String,
    /// Registered API key, if any.
    pub api_key: Option<String>,
    /// Whether the API key is the active default.
    pub api_key_active: bool,
    /// Stored CLI login profile blob (JSON), if any.
    pub profile_blob: Option<String>,
    /// Whether the profile is selected for use.
    pub profile_selected: bool,
    /// RFC3339 last update time.
    pub updated_at: String,
}

/// One stored SSH key pair.
#[derive(Clone, Debug)]
pub struct SshKeyRow {
    /// Owning user.
    pub user_id: String,
    /// Key name (file stem on materialization).
    pub key_name: String,
    /// PEM private key material.
    pub private_key: String,
    /// Public key line.
    pub public_key: String,
    /// RFC3339 creation time.
    pub created_at: String,
}
