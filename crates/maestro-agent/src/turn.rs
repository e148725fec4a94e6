//! Turn request and result types.

use std::path::PathBuf;

use maestro_core::design::Agent;
use maestro_credentials::CredentialMode;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::events::CliEvent;
use crate::prompt::WorkspaceInstruction;

/// One tool invocation observed during a turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Tool name.
    pub name: String,
    /// Arguments as reported.
    pub arguments: serde_json::Value,
}

/// One tool result observed during a turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Tool name.
    pub name: String,
    /// Result payload.
    pub payload: serde_json::Value,
}

/// Everything needed to run one agent turn.
pub struct TurnRequest {
    /// The agent (prompt, role, tool preference, model override).
    pub agent: Agent,
    /// Input text for the turn.
    pub input: String,
    /// Working directory for the subprocess.
    pub workspace: Option<PathBuf>,
    /// Workspace instruction for tool-enabled turns (at most one form).
    pub instruction: Option<WorkspaceInstruction>,
    /// Resolved credentials.
    pub credentials: CredentialMode,
    /// Cancellation scope (block-level).
    pub cancel: CancellationToken,
    /// Optional live event forwarding (chunks, tool events).
    pub events: Option<mpsc::UnboundedSender<CliEvent>>,
}

impl TurnRequest {
    /// Minimal request: agent + input, ambient credentials, no workspace.
    #[must_use]
    pub fn new(agent: Agent, input: impl Into<String>) -> Self {
        Self {
            agent,
            input: input.into(),
            workspace: None,
            instruction: None,
            credentials: CredentialMode::Ambient,
            cancel: CancellationToken::new(),
            events: None,
        }
    }
}

/// Aggregated result of one agent turn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    /// Concatenated assistant text, in arrival order.
    pub text: String,
    /// Observed tool calls, arrival order preserved.
    pub tool_calls: Vec<ToolInvocation>,
    /// Observed tool results, arrival order preserved.
    pub tool_results: Vec<ToolOutcome>,
    /// Total tokens across usage events.
    pub tokens: u64,
    /// Total reported cost.
    pub cost_usd: f64,
    /// Wall-clock duration of the turn.
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::design::Agent;

    #[test]
    fn new_request_defaults() {
        let req = TurnRequest::new(Agent::new("A", "p"), "hello");
        assert_eq!(req.input, "hello");
        assert!(req.workspace.is_none());
        assert!(req.instruction.is_none());
        assert_eq!(req.credentials, CredentialMode::Ambient);
        assert!(!req.cancel.is_cancelled());
    }

    #[test]
    fn result_serializes() {
        let result = TurnResult {
            text: "hi".into(),
            tool_calls: vec![ToolInvocation {
                name: "bash".into(),
                arguments: serde_json::json!({"command": "ls"}),
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["text"], "hi");
        assert_eq!(json["tool_calls"][0]["name"], "bash");
    }
}
