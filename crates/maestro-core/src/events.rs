//! Execution event vocabulary.
//!
//! The orchestration engine emits [`ExecutionEvent`]s on a per-execution
//! channel; the HTTP layer forwards them to callers as a newline-delimited
//! JSON stream. Per-block and per-turn ordering guarantees are the
//! emitter's responsibility; this module only defines the shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{BlockId, ExecutionId};

/// One event observed during an orchestration execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// A block began executing.
    BlockStarted {
        /// Owning execution.
        execution_id: ExecutionId,
        /// The block.
        block_id: BlockId,
        /// Pattern name (`sequential`, `parallel`, ...).
        kind: String,
    },
    /// An agent turn began.
    AgentStarted {
        /// Owning execution.
        execution_id: ExecutionId,
        /// Enclosing block.
        block_id: BlockId,
        /// Agent name.
        agent_name: String,
    },
    /// A chunk of assistant text arrived.
    AgentChunk {
        /// Owning execution.
        execution_id: ExecutionId,
        /// Enclosing block.
        block_id: BlockId,
        /// Agent name.
        agent_name: String,
        /// Text delta, in arrival order.
        text: String,
    },
    /// The agent invoked a tool.
    AgentToolCall {
        /// Owning execution.
        execution_id: ExecutionId,
        /// Enclosing block.
        block_id: BlockId,
        /// Agent name.
        agent_name: String,
        /// Tool name.
        tool_name: String,
        /// Tool arguments as reported by the CLI.
        arguments: serde_json::Value,
    },
    /// A tool returned a result to the agent.
    AgentToolResult {
        /// Owning execution.
        execution_id: ExecutionId,
        /// Enclosing block.
        block_id: BlockId,
        /// Agent name.
        agent_name: String,
        /// Tool name.
        tool_name: String,
        /// Result payload (possibly truncated preview).
        payload: serde_json::Value,
    },
    /// An agent turn finished.
    AgentCompleted {
        /// Owning execution.
        execution_id: ExecutionId,
        /// Enclosing block.
        block_id: BlockId,
        /// Agent name.
        agent_name: String,
        /// Concatenated assistant text.
        output: String,
        /// Tokens consumed by the turn.
        tokens: u64,
        /// Cost of the turn in USD.
        cost_usd: f64,
        /// Wall-clock duration.
        elapsed_ms: u64,
    },
    /// A block finished; `output` is the pattern's block output.
    BlockCompleted {
        /// Owning execution.
        execution_id: ExecutionId,
        /// The block.
        block_id: BlockId,
        /// Block output fed to downstream blocks.
        output: String,
    },
    /// Isolated workspaces were provisioned for a block.
    WorkspaceInfo {
        /// Owning execution.
        execution_id: ExecutionId,
        /// Parent temp directory (`orchestration_isolated_<execution_id>`).
        parent_dir: String,
        /// Absolute clone path per agent name.
        agent_paths: BTreeMap<String, String>,
    },
    /// The execution finished successfully.
    ExecutionCompleted {
        /// The execution.
        execution_id: ExecutionId,
        /// Final output (last block in topological order).
        output: String,
    },
    /// The execution terminated with a failure.
    ExecutionFailed {
        /// The execution.
        execution_id: ExecutionId,
        /// Boundary error kind (`AgentFailed`, `Cancelled`, ...).
        error_kind: String,
        /// Human-readable message.
        message: String,
    },
}

impl ExecutionEvent {
    /// Snake-case event type tag (matches the serialized `type` field).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BlockStarted { .. } => "block_started",
            Self::AgentStarted { .. } => "agent_started",
            Self::AgentChunk { .. } => "agent_chunk",
            Self::AgentToolCall { .. } => "agent_tool_call",
            Self::AgentToolResult { .. } => "agent_tool_result",
            Self::AgentCompleted { .. } => "agent_completed",
            Self::BlockCompleted { .. } => "block_completed",
            Self::WorkspaceInfo { .. } => "workspace_info",
            Self::ExecutionCompleted { .. } => "execution_completed",
            Self::ExecutionFailed { .. } => "execution_failed",
        }
    }

    /// Whether this event terminates the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ExecutionCompleted { .. } | Self::ExecutionFailed { .. }
        )
    }

    /// The owning execution id.
    #[must_use]
    pub fn execution_id(&self) -> &ExecutionId {
        match self {
            Self::BlockStarted { execution_id, .. }
            | Self::AgentStarted { execution_id, .. }
            | Self::AgentChunk { execution_id, .. }
            | Self::AgentToolCall { execution_id, .. }
            | Self::AgentToolResult { execution_id, .. }
            | Self::AgentCompleted { execution_id, .. }
            | Self::BlockCompleted { execution_id, .. }
            | Self::WorkspaceInfo { execution_id, .. }
            | Self::ExecutionCompleted { execution_id, .. }
            | Self::ExecutionFailed { execution_id, .. } => execution_id,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
