//! Block execution context shared by every pattern.
//!
//! [`BlockContext::run_agent_turn`] is the single place where per-turn
//! events are labeled and ordered: `agent_started` always precedes the
//! agent's chunks/tool events, and `agent_completed` follows all of them.

use std::collections::BTreeMap;
use std::path::PathBuf;

use maestro_agent::events::CliEvent;
use maestro_agent::prompt::WorkspaceInstruction;
use maestro_agent::turn::{TurnRequest, TurnResult};
use maestro_core::design::{Agent, Block};
use maestro_core::ids::{BlockId, ExecutionId};
use maestro_core::{ExecutionEvent, MaestroError};
use maestro_credentials::CredentialMode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::emitter::EventEmitter;
use crate::executor::TurnExecutor;

/// Where this block's agent turns run.
#[derive(Clone, Debug, Default)]
pub enum WorkspaceBinding {
    /// No filesystem workspace.
    #[default]
    None,
    /// One clone shared by every agent.
    Shared(PathBuf),
    /// One clone per agent under the isolated parent.
    Isolated {
        /// The `orchestration_isolated_<execution_id>` parent.
        parent: PathBuf,
        /// Absolute clone path per agent name.
        agent_paths: BTreeMap<String, PathBuf>,
    },
}

/// Input delivered to a block by the DAG executor.
#[derive(Clone, Debug, Default)]
pub struct BlockInput {
    /// Block task plus block-level upstream aggregation.
    pub base: String,
    /// Agent-scoped routed context, keyed by target agent name.
    pub per_agent: BTreeMap<String, String>,
}

impl BlockInput {
    /// Input consisting of the base text only.
    #[must_use]
    pub fn base_only(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            per_agent: BTreeMap::new(),
        }
    }

    /// The effective input for one agent: base text plus any routed context.
    #[must_use]
    pub fn for_agent(&self, agent_name: &str) -> String {
        match self.per_agent.get(agent_name) {
            Some(routed) => format!("{}\n\n{routed}", self.base),
            None => self.base.clone(),
        }
    }
}

/// Result of one block invocation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockOutput {
    /// The block output fed to downstream blocks.
    pub output: String,
    /// Each agent's final assistant text (for agent-level edges).
    pub agent_outputs: BTreeMap<String, String>,
}

/// Everything a pattern invocation needs.
pub struct BlockContext<'a> {
    /// Owning execution.
    pub execution_id: &'a ExecutionId,
    /// Workflow scope used in workspace instructions.
    pub workflow_id: &'a str,
    /// The block being executed.
    pub block: &'a Block,
    /// Input from the DAG executor.
    pub input: BlockInput,
    /// Turn execution seam.
    pub executor: &'a dyn TurnExecutor,
    /// Event channel.
    pub emitter: &'a EventEmitter,
    /// Resolved credentials for the invoking user.
    pub credentials: CredentialMode,
    /// Cancellation scope shared by the whole block invocation.
    pub cancel: CancellationToken,
    /// Workspace binding for the block's turns.
    pub workspaces: WorkspaceBinding,
    /// Structured summary of the enclosing design (reflection only).
    pub design_summary: Option<String>,
}

impl BlockContext<'_> {
    fn block_id(&self) -> &BlockId {
        &self.block.id
    }

    fn turn_request(&self, agent: &Agent, input: String) -> TurnRequest {
        let (workspace, instruction) = match &self.workspaces {
            WorkspaceBinding::None => (None, None),
            WorkspaceBinding::Shared(path) => (
                Some(path.clone()),
                Some(WorkspaceInstruction::Shared {
                    workflow_id: self.workflow_id.to_owned(),
                }),
            ),
            WorkspaceBinding::Isolated { agent_paths, .. } => {
                let path = agent_paths.get(&agent.name).cloned();
                let instruction = path.as_ref().map(|p| WorkspaceInstruction::Isolated {
                    workflow_id: self.workflow_id.to_owned(),
                    workspace_path: p.to_string_lossy().into_owned(),
                });
                (path, instruction)
            }
        };

        TurnRequest {
            agent: agent.clone(),
            input,
            workspace,
            instruction,
            credentials: self.credentials.clone(),
            cancel: self.cancel.clone(),
            events: None,
        }
    }

    /// Run one labeled agent turn, forwarding its live events.
    ///
    /// Ordering: `agent_started` is emitted before the subprocess starts;
    /// every chunk/tool event is forwarded in arrival order; the forwarding
    /// drain completes before `agent_completed` is emitted.
    pub async fn run_agent_turn(
        &self,
        agent: &Agent,
        input: String,
    ) -> Result<TurnResult, MaestroError> {
        if self.cancel.is_cancelled() {
            return Err(MaestroError::Cancelled);
        }

        self.emitter.emit(ExecutionEvent::AgentStarted {
            execution_id: self.execution_id.clone(),
            block_id: self.block_id().clone(),
            agent_name: agent.name.clone(),
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut req = self.turn_request(agent, input);
        req.events = Some(tx);

        let forward = {
            let emitter = self.emitter.clone();
            let execution_id = self.execution_id.clone();
            let block_id = self.block_id().clone();
            let agent_name = agent.name.clone();
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    forward_cli_event(&emitter, &execution_id, &block_id, &agent_name, event);
                }
            })
        };

        let result = self.executor.run_turn(req).await;
        // The sender inside the request is dropped when the turn finishes,
        // so the forward task drains fully before agent_completed.
        let _ = forward.await;

        match result {
            Ok(result) => {
                self.emitter.emit(ExecutionEvent::AgentCompleted {
                    execution_id: self.execution_id.clone(),
                    block_id: self.block_id().clone(),
                    agent_name: agent.name.clone(),
                    output: result.text.clone(),
                    tokens: result.tokens,
                    cost_usd: result.cost_usd,
                    elapsed_ms: result.elapsed_ms,
                });
                Ok(result)
            }
            Err(err) => Err(err),
        }
    }
}

fn forward_cli_event(
    emitter: &EventEmitter,
    execution_id: &ExecutionId,
    block_id: &BlockId,
    agent_name: &str,
    event: CliEvent,
) {
    let event = match event {
        CliEvent::Text { text } => ExecutionEvent::AgentChunk {
            execution_id: execution_id.clone(),
            block_id: block_id.clone(),
            agent_name: agent_name.to_owned(),
            text,
        },
        CliEvent::ToolCall { name, arguments } => ExecutionEvent::AgentToolCall {
            execution_id: execution_id.clone(),
            block_id: block_id.clone(),
            agent_name: agent_name.to_owned(),
            tool_name: name,
            arguments,
        },
        CliEvent::ToolResult { name, payload } => ExecutionEvent::AgentToolResult {
            execution_id: execution_id.clone(),
            block_id: block_id.clone(),
            agent_name: agent_name.to_owned(),
            tool_name: name,
            payload,
        },
        // Usage feeds the turn aggregate; errors and notes are not part of
        // the execution event vocabulary.
        CliEvent::Usage { .. } | CliEvent::Error { .. } | CliEvent::SystemNote { .. } => return,
    };
    emitter.emit(event);
}

/// Label worker outputs for aggregation: `--- <name> ---\n<text>`.
#[must_use]
pub fn label_outputs(outputs: &[(String, String)]) -> String {
    outputs
        .iter()
        .map(|(name, text)| format!("--- {name} ---\n{text}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_agent_appends_routed_context() {
        let mut input = BlockInput::base_only("task");
        let _ = input
            .per_agent
            .insert("UseExtract".to_owned(), "banana".to_owned());

        assert_eq!(input.for_agent("UseExtract"), "task\n\nbanana");
        assert_eq!(input.for_agent("Other"), "task");
    }

    #[test]
    fn label_outputs_format() {
        let labeled = label_outputs(&[
            ("A".to_owned(), "1".to_owned()),
            ("B".to_owned(), "2".to_owned()),
        ]);
        assert_eq!(labeled, "--- A ---\n1\n\n--- B ---\n2");
    }

    #[test]
    fn label_outputs_empty() {
        assert_eq!(label_outputs(&[]), "");
    }
}
