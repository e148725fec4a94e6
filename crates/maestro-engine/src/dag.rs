//! Design DAG execution.
//!
//! Blocks run sequentially in a stable topological order (level-parallelism
//! is a permitted optimization, not a contract). Data flows over block-level
//! edges as a labeled "Previous Results" aggregation and over agent-level
//! edges as per-agent routed context, merged deterministically: block-level
//! predecessors first (in predecessor id order), then agent-level bindings
//! (in source id order). Workspaces are provisioned per block and always
//! cleaned up, whatever the exit path.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use maestro_core::design::{Block, BlockKind, Design};
use maestro_core::ids::ExecutionId;
use maestro_core::{ExecutionEvent, MaestroError};
use maestro_credentials::CredentialMode;
use maestro_workspace::{SshKeyMaterial, WorkspaceProvisioner};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::context::{BlockContext, BlockInput, BlockOutput, WorkspaceBinding};
use crate::emitter::EventEmitter;
use crate::executor::TurnExecutor;
use crate::patterns;

/// Per-execution options resolved by the caller.
pub struct ExecuteOptions {
    /// Pinned execution id (e.g. for log correlation); generated when absent.
    pub execution_id: Option<ExecutionId>,
    /// Workflow scope for workspace instructions; defaults to the execution id.
    pub workflow_id: Option<String>,
    /// Credentials resolved for the invoking user.
    pub credentials: CredentialMode,
    /// SSH keys materialized for authenticated clones.
    pub ssh_keys: Vec<SshKeyMaterial>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            execution_id: None,
            workflow_id: None,
            credentials: CredentialMode::Ambient,
            ssh_keys: Vec::new(),
        }
    }
}

/// Final result of a design execution.
#[derive(Clone, Debug)]
pub struct ExecutionSummary {
    /// The execution.
    pub execution_id: ExecutionId,
    /// Output of the last block in topological order.
    pub output: String,
    /// Every block's output, by block id.
    pub block_outputs: BTreeMap<String, String>,
}

/// Executes designs over a [`TurnExecutor`] and a workspace provisioner.
pub struct DesignExecutor {
    executor: Arc<dyn TurnExecutor>,
    provisioner: WorkspaceProvisioner,
}

impl DesignExecutor {
    /// Build an executor.
    #[must_use]
    pub fn new(executor: Arc<dyn TurnExecutor>, provisioner: WorkspaceProvisioner) -> Self {
        Self {
            executor,
            provisioner,
        }
    }

    /// The provisioner (for admission checks at the API boundary).
    #[must_use]
    pub fn provisioner(&self) -> &WorkspaceProvisioner {
        &self.provisioner
    }

    /// Execute a whole design, emitting events and guaranteeing cleanup.
    ///
    /// The first block failure aborts the execution; prior blocks' outputs
    /// remain in the event trace. The terminal event is always emitted.
    #[instrument(skip_all, fields(blocks = design.blocks.len()))]
    pub async fn execute(
        &self,
        design: &Design,
        initial_task: &str,
        opts: &ExecuteOptions,
        emitter: &EventEmitter,
        cancel: &CancellationToken,
    ) -> Result<ExecutionSummary, MaestroError> {
        design.validate()?;
        let execution_id = opts.execution_id.clone().unwrap_or_default();
        info!(execution_id = %execution_id, "execution starting");

        let result = self
            .execute_inner(design, initial_task, opts, emitter, cancel, &execution_id)
            .await;

        // Cleanup runs on success, failure, and cancellation alike.
        self.provisioner.cleanup(&execution_id).await;

        match result {
            Ok(summary) => {
                emitter.emit(ExecutionEvent::ExecutionCompleted {
                    execution_id: execution_id.clone(),
                    output: summary.output.clone(),
                });
                info!(execution_id = %execution_id, "execution completed");
                Ok(summary)
            }
            Err(err) => {
                emitter.emit(ExecutionEvent::ExecutionFailed {
                    execution_id: execution_id.clone(),
                    error_kind: err.kind().to_owned(),
                    message: err.to_string(),
                });
                warn!(execution_id = %execution_id, error = %err, "execution failed");
                Err(err)
            }
        }
    }

    /// Execute a single block as a one-block design.
    pub async fn execute_block(
        &self,
        block: Block,
        initial_task: &str,
        opts: &ExecuteOptions,
        emitter: &EventEmitter,
        cancel: &CancellationToken,
    ) -> Result<ExecutionSummary, MaestroError> {
        let design = Design::single(block);
        self.execute(&design, initial_task, opts, emitter, cancel)
            .await
    }

    async fn execute_inner(
        &self,
        design: &Design,
        initial_task: &str,
        opts: &ExecuteOptions,
        emitter: &EventEmitter,
        cancel: &CancellationToken,
        execution_id: &ExecutionId,
    ) -> Result<ExecutionSummary, MaestroError> {
        let order = design.topological_order()?;
        let workflow_id = opts
            .workflow_id
            .clone()
            .unwrap_or_else(|| execution_id.to_string());

        let mut outputs: BTreeMap<String, BlockOutput> = BTreeMap::new();
        let mut last_output = String::new();

        for block_id in &order {
            if cancel.is_cancelled() {
                return Err(MaestroError::Cancelled);
            }
            let block = design
                .block(block_id)
                .ok_or_else(|| MaestroError::Internal(format!("block {block_id} vanished")))?;

            let input = build_block_input(design, block, initial_task, &outputs);
            let workspaces = self
                .provision_for_block(block, execution_id, opts, emitter)
                .await?;

            emitter.emit(ExecutionEvent::BlockStarted {
                execution_id: execution_id.clone(),
                block_id: block.id.clone(),
                kind: block.kind.to_string(),
            });

            let ctx = BlockContext {
                execution_id,
                workflow_id: &workflow_id,
                block,
                input,
                executor: self.executor.as_ref(),
                emitter,
                credentials: opts.credentials.clone(),
                cancel: cancel.clone(),
                workspaces,
                design_summary: (block.kind == BlockKind::Reflection)
                    .then(|| build_design_summary(design, &outputs)),
            };

            let output = patterns::run_block(&ctx).await?;

            emitter.emit(ExecutionEvent::BlockCompleted {
                execution_id: execution_id.clone(),
                block_id: block.id.clone(),
                output: output.output.clone(),
            });

            last_output = output.output.clone();
            let _ = outputs.insert(block.id.to_string(), output);
        }

        Ok(ExecutionSummary {
            execution_id: execution_id.clone(),
            output: last_output,
            block_outputs: outputs
                .into_iter()
                .map(|(id, out)| (id, out.output))
                .collect(),
        })
    }

    async fn provision_for_block(
        &self,
        block: &Block,
        execution_id: &ExecutionId,
        opts: &ExecuteOptions,
        emitter: &EventEmitter,
    ) -> Result<WorkspaceBinding, MaestroError> {
        if block.isolate_agent_workspaces {
            let names: Vec<String> = block.agents.iter().map(|a| a.name.clone()).collect();
            let isolated = self
                .provisioner
                .provision_isolated(
                    block.git_repo.as_deref(),
                    block.branch.as_deref(),
                    execution_id,
                    &names,
                    &opts.ssh_keys,
                )
                .await?;

            emitter.emit(ExecutionEvent::WorkspaceInfo {
                execution_id: execution_id.clone(),
                parent_dir: isolated.parent.to_string_lossy().into_owned(),
                agent_paths: isolated
                    .agent_paths
                    .iter()
                    .map(|(name, path)| (name.clone(), path.to_string_lossy().into_owned()))
                    .collect(),
            });

            Ok(WorkspaceBinding::Isolated {
                parent: isolated.parent,
                agent_paths: isolated.agent_paths,
            })
        } else if block.git_repo.is_some() {
            let shared = self
                .provisioner
                .provision_shared(
                    block.git_repo.as_deref(),
                    block.branch.as_deref(),
                    execution_id,
                    &opts.ssh_keys,
                )
                .await?;
            Ok(WorkspaceBinding::Shared(shared.path))
        } else {
            Ok(WorkspaceBinding::None)
        }
    }
}

/// Compose a block's input from the initial task, block-level predecessors
/// (in predecessor id order), and agent-level bindings (in source id order).
fn build_block_input(
    design: &Design,
    block: &Block,
    initial_task: &str,
    outputs: &BTreeMap<String, BlockOutput>,
) -> BlockInput {
    let predecessors = design.block_predecessors(&block.id);

    let base = if predecessors.is_empty() {
        if initial_task.is_empty() {
            block.task.clone()
        } else {
            format!("{}\n\n{initial_task}", block.task)
        }
    } else {
        let joined = predecessors
            .iter()
            .filter_map(|id| outputs.get(id.as_str()))
            .map(|out| out.output.as_str())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        format!("{}\n\nPrevious Results:\n{joined}", block.task)
    };

    let mut base = base;
    let mut per_agent = BTreeMap::new();
    for binding in design.agent_bindings(&block.id) {
        let Some(source) = outputs.get(binding.source_block.as_str()) else {
            continue;
        };
        let routed = match &binding.source_agent {
            Some(agent) => source.agent_outputs.get(agent).cloned().unwrap_or_default(),
            None => source.output.clone(),
        };
        match &binding.target_agent {
            Some(target) => {
                per_agent
                    .entry(target.clone())
                    .and_modify(|existing: &mut String| {
                        existing.push_str("\n\n");
                        existing.push_str(&routed);
                    })
                    .or_insert(routed);
            }
            // Source-scoped only: folds into the block-level base, after the
            // block-level aggregation.
            None => {
                base.push_str("\n\n");
                base.push_str(&routed);
            }
        }
    }

    BlockInput { base, per_agent }
}

/// Structured summary of a design for the reflection pattern.
fn build_design_summary(design: &Design, outputs: &BTreeMap<String, BlockOutput>) -> String {
    let mut summary = String::from("Design summary:\n");
    for block in &design.blocks {
        let _ = writeln!(summary, "Block {} ({}): {}", block.id, block.kind, block.task);
        for agent in &block.agents {
            let _ = writeln!(
                summary,
                "  - Agent {} ({:?}): {}",
                agent.name, agent.role, agent.system_prompt
            );
        }
    }
    if !outputs.is_empty() {
        summary.push_str("\nLatest results:\n");
        for (block_id, output) in outputs {
            let _ = writeln!(summary, "--- {block_id} ---\n{}", output.output);
        }
    }
    summary
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use maestro_core::design::{Agent, Connection};

    use crate::testutil::ScriptedExecutor;

    fn executor_with(script: ScriptedExecutor) -> (DesignExecutor, Arc<ScriptedExecutor>) {
        let script = Arc::new(script);
        let dag = DesignExecutor::new(
            script.clone(),
            WorkspaceProvisioner::new(std::env::temp_dir().join("maestro-dag-tests")),
        );
        (dag, script)
    }

    fn seq_block(id: &str, agent: &str) -> Block {
        Block::new(id, BlockKind::Sequential, format!("task {id}"))
            .with_agent(Agent::new(agent, "p"))
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn single_block_design_completes() {
        let (dag, _) = executor_with(ScriptedExecutor::table(&[("A", "done")]));
        let emitter = EventEmitter::new();
        let mut rx = emitter.subscribe();

        let summary = dag
            .execute(
                &Design::single(seq_block("b1", "A")),
                "go",
                &ExecuteOptions::default(),
                &emitter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(summary.output, "done");
        let events = drain(&mut rx);
        let kinds: Vec<_> = events.iter().map(ExecutionEvent::event_type).collect();
        assert_eq!(kinds.first(), Some(&"block_started"));
        assert_eq!(kinds.last(), Some(&"execution_completed"));
    }

    #[tokio::test]
    async fn initial_task_reaches_source_blocks() {
        let (dag, script) = executor_with(ScriptedExecutor::table(&[("A", "x")]));
        let emitter = EventEmitter::new();

        let _ = dag
            .execute(
                &Design::single(seq_block("b1", "A")),
                "the initial task",
                &ExecuteOptions::default(),
                &emitter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(script.inputs_for("A")[0].contains("the initial task"));
    }

    #[tokio::test]
    async fn blocks_visit_once_in_topological_order() {
        let (dag, script) = executor_with(ScriptedExecutor::new(|agent, _| Ok(agent.to_owned())));
        let emitter = EventEmitter::new();

        // Diamond: b1 -> {b2, b3} -> b4
        let design = Design {
            blocks: vec![
                seq_block("b1", "A1"),
                seq_block("b2", "A2"),
                seq_block("b3", "A3"),
                seq_block("b4", "A4"),
            ],
            connections: vec![
                Connection {
                    source_block: "b1".into(),
                    target_block: "b2".into(),
                    source_agent: None,
                    target_agent: None,
                },
                Connection {
                    source_block: "b1".into(),
                    target_block: "b3".into(),
                    source_agent: None,
                    target_agent: None,
                },
                Connection {
                    source_block: "b2".into(),
                    target_block: "b4".into(),
                    source_agent: None,
                    target_agent: None,
                },
                Connection {
                    source_block: "b3".into(),
                    target_block: "b4".into(),
                    source_agent: None,
                    target_agent: None,
                },
            ],
        };

        let _ = dag
            .execute(
                &design,
                "",
                &ExecuteOptions::default(),
                &emitter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(script.call_order(), vec!["A1", "A2", "A3", "A4"]);
        // b4 aggregates both predecessors.
        let b4_input = &script.inputs_for("A4")[0];
        assert!(b4_input.contains("Previous Results:"));
        assert!(b4_input.contains("A2\n\n---\n\nA3"));
    }

    #[tokio::test]
    async fn cyclic_design_rejected_before_any_turn() {
        let (dag, script) = executor_with(ScriptedExecutor::table(&[("A", "x")]));
        let emitter = EventEmitter::new();
        let design = Design {
            blocks: vec![seq_block("b1", "A"), seq_block("b2", "B")],
            connections: vec![
                Connection {
                    source_block: "b1".into(),
                    target_block: "b2".into(),
                    source_agent: None,
                    target_agent: None,
                },
                Connection {
                    source_block: "b2".into(),
                    target_block: "b1".into(),
                    source_agent: None,
                    target_agent: None,
                },
            ],
        };

        let err = dag
            .execute(
                &design,
                "",
                &ExecuteOptions::default(),
                &emitter,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_matches!(err, MaestroError::DesignCyclic { .. });
        assert!(script.call_order().is_empty());
    }

    #[tokio::test]
    async fn agent_level_edge_routes_to_named_agent_only() {
        // S4: B1.Extract -> B2.UseExtract; Other gets block-level input only.
        let (dag, script) = executor_with(ScriptedExecutor::new(|agent, _| {
            Ok(match agent {
                "Extract" => "banana".to_owned(),
                other => other.to_owned(),
            })
        }));
        let emitter = EventEmitter::new();

        let design = Design {
            blocks: vec![
                Block::new("B1", BlockKind::Sequential, "return the word 'banana'")
                    .with_agent(Agent::new("Extract", "p")),
                Block::new("B2", BlockKind::Parallel, "use what you got")
                    .with_agent(Agent::new("UseExtract", "p"))
                    .with_agent(Agent::new("Other", "p")),
            ],
            connections: vec![Connection {
                source_block: "B1".into(),
                target_block: "B2".into(),
                source_agent: Some("Extract".into()),
                target_agent: Some("UseExtract".into()),
            }],
        };

        let _ = dag
            .execute(
                &design,
                "",
                &ExecuteOptions::default(),
                &emitter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(script.inputs_for("UseExtract")[0].contains("banana"));
        assert!(!script.inputs_for("Other")[0].contains("banana"));
    }

    #[tokio::test]
    async fn block_failure_aborts_and_preserves_prior_outputs_in_trace() {
        let (dag, script) = executor_with(ScriptedExecutor::new(|agent, _| match agent {
            "Good" => Ok("good output".to_owned()),
            _ => Err(MaestroError::AgentFailed {
                agent_name: agent.to_owned(),
                exit_code: 1,
                stderr_tail: "boom".into(),
            }),
        }));
        let emitter = EventEmitter::new();
        let mut rx = emitter.subscribe();

        let design = Design {
            blocks: vec![
                seq_block("b1", "Good"),
                seq_block("b2", "Bad"),
                seq_block("b3", "Never"),
            ],
            connections: vec![
                Connection {
                    source_block: "b1".into(),
                    target_block: "b2".into(),
                    source_agent: None,
                    target_agent: None,
                },
                Connection {
                    source_block: "b2".into(),
                    target_block: "b3".into(),
                    source_agent: None,
                    target_agent: None,
                },
            ],
        };

        let err = dag
            .execute(
                &design,
                "",
                &ExecuteOptions::default(),
                &emitter,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_matches!(err, MaestroError::AgentFailed { .. });
        assert!(script.inputs_for("Never").is_empty());

        let events = drain(&mut rx);
        // b1's completed output survives in the trace.
        assert!(events.iter().any(|e| matches!(
            e,
            ExecutionEvent::BlockCompleted { output, .. } if output == "good output"
        )));
        assert_matches!(
            events.last().unwrap(),
            ExecutionEvent::ExecutionFailed { error_kind, .. } if error_kind == "AgentFailed"
        );
    }

    #[tokio::test]
    async fn block_started_follows_predecessor_completion() {
        let (dag, _) = executor_with(ScriptedExecutor::new(|agent, _| Ok(agent.to_owned())));
        let emitter = EventEmitter::new();
        let mut rx = emitter.subscribe();

        let design = Design {
            blocks: vec![seq_block("b1", "A"), seq_block("b2", "B")],
            connections: vec![Connection {
                source_block: "b1".into(),
                target_block: "b2".into(),
                source_agent: None,
                target_agent: None,
            }],
        };

        let _ = dag
            .execute(
                &design,
                "",
                &ExecuteOptions::default(),
                &emitter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let events = drain(&mut rx);
        let b1_completed = events
            .iter()
            .position(|e| {
                matches!(e, ExecutionEvent::BlockCompleted { block_id, .. } if block_id.as_str() == "b1")
            })
            .unwrap();
        let b2_started = events
            .iter()
            .position(|e| {
                matches!(e, ExecutionEvent::BlockStarted { block_id, .. } if block_id.as_str() == "b2")
            })
            .unwrap();
        assert!(b1_completed < b2_started);
    }

    #[tokio::test]
    async fn isolated_workspaces_provisioned_reported_and_cleaned() {
        // S5 without git: two agents, isolated workspaces, parent gone after.
        let temp_root = tempfile::tempdir().unwrap();
        let script = Arc::new(ScriptedExecutor::table(&[("A", "x"), ("B", "y")]));
        let dag = DesignExecutor::new(
            script.clone(),
            WorkspaceProvisioner::new(temp_root.path().to_path_buf()),
        );
        let emitter = EventEmitter::new();
        let mut rx = emitter.subscribe();

        let mut block = Block::new("b1", BlockKind::Parallel, "t")
            .with_agent(Agent::new("A", "p"))
            .with_agent(Agent::new("B", "p"));
        block.isolate_agent_workspaces = true;

        let _ = dag
            .execute(
                &Design::single(block),
                "",
                &ExecuteOptions::default(),
                &emitter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let events = drain(&mut rx);
        let info = events
            .iter()
            .find_map(|e| match e {
                ExecutionEvent::WorkspaceInfo {
                    parent_dir,
                    agent_paths,
                    ..
                } => Some((parent_dir.clone(), agent_paths.clone())),
                _ => None,
            })
            .expect("workspace_info must be emitted");
        assert!(info.0.contains("orchestration_isolated_"));
        assert_eq!(info.1.len(), 2);
        // Parent directory is gone after execution end.
        assert!(!std::path::Path::new(&info.0).exists());
    }

    #[tokio::test]
    async fn cancellation_fails_execution_and_cleans_up() {
        let temp_root = tempfile::tempdir().unwrap();
        let script = Arc::new(ScriptedExecutor::table(&[("A", "x")]));
        let dag = DesignExecutor::new(
            script,
            WorkspaceProvisioner::new(temp_root.path().to_path_buf()),
        );
        let emitter = EventEmitter::new();
        let mut rx = emitter.subscribe();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = dag
            .execute(
                &Design::single(seq_block("b1", "A")),
                "",
                &ExecuteOptions::default(),
                &emitter,
                &cancel,
            )
            .await
            .unwrap_err();

        assert_matches!(err, MaestroError::Cancelled);
        let events = drain(&mut rx);
        assert_matches!(
            events.last().unwrap(),
            ExecutionEvent::ExecutionFailed { error_kind, .. } if error_kind == "Cancelled"
        );
    }
}
