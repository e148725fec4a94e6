//! Deployment execution and dynamic path dispatch.
//!
//! One code path serves all three triggers: manual execute, scheduler
//! fires, and dynamic endpoint POSTs. Credential resolution happens before
//! the execution log is opened, so precondition failures never leave a
//! `failed` row behind.
//!
//! Dispatch has no streaming surface, so the event trace is the caller's
//! only view of the run: a collector task drains the emitter for the whole
//! execution (the ring buffer alone cannot hold a long run), and a failed
//! run returns the events captured up to the failure point alongside the
//! error.

use std::fmt;
use std::sync::Arc;

use maestro_core::ids::ExecutionId;
use maestro_core::{ExecutionEvent, MaestroError};
use maestro_credentials::{CredentialMode, CredentialProvider};
use maestro_engine::{DesignExecutor, EventEmitter, ExecuteOptions};
use maestro_store::ConnectionPool;
use maestro_store::repositories::{DeploymentRepo, DesignRepo, ExecutionLogRepo};
use maestro_store::row_types::{DeploymentStatus, ExecutionStatus, TriggerKind};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Result of one deployment execution.
#[derive(Clone, Debug, Serialize)]
pub struct ExecutionOutcome {
    /// Engine execution id.
    pub execution_id: String,
    /// Execution-log row id.
    pub execution_log_id: String,
    /// Final design output.
    pub output: String,
    /// Full event trace of the run.
    pub trace: Vec<ExecutionEvent>,
}

/// A failed dispatch, carrying the events captured before the failure.
#[derive(Debug)]
pub struct DispatchError {
    /// The terminal error.
    pub error: MaestroError,
    /// Partial event trace up to the failure point.
    pub trace: Vec<ExecutionEvent>,
}

impl From<MaestroError> for DispatchError {
    fn from(error: MaestroError) -> Self {
        Self {
            error,
            trace: Vec::new(),
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Drain a subscription into a `Vec` until the terminal event (or channel
/// close). Lagged notices resume the drain; the buffer drops oldest, so a
/// lag loses events but never ends the trace early.
fn collect_trace(
    mut events: broadcast::Receiver<ExecutionEvent>,
) -> tokio::task::JoinHandle<Vec<ExecutionEvent>> {
    tokio::spawn(async move {
        let mut trace = Vec::new();
        loop {
            match events.recv().await {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    trace.push(event);
                    if terminal {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(count, "trace collector lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        trace
    })
}

/// Executes deployments and resolves dynamic endpoint paths.
pub struct Dispatcher {
    pool: ConnectionPool,
    engine: Arc<DesignExecutor>,
    credentials: Arc<CredentialProvider>,
}

impl Dispatcher {
    /// Build a dispatcher.
    #[must_use]
    pub fn new(
        pool: ConnectionPool,
        engine: Arc<DesignExecutor>,
        credentials: Arc<CredentialProvider>,
    ) -> Self {
        Self {
            pool,
            engine,
            credentials,
        }
    }

    /// Resolve `path` to an active deployment and execute it with `input`.
    ///
    /// Matching is exact. Unknown paths are `EndpointNotFound`; inactive
    /// deployments are `EndpointConflict`.
    pub async fn dispatch_path(
        &self,
        path: &str,
        input: serde_json::Value,
        user_id: Option<&str>,
    ) -> Result<ExecutionOutcome, DispatchError> {
        let deployment = {
            let conn = self
                .pool
                .get()
                .map_err(|e| MaestroError::Storage(e.to_string()))?;
            DeploymentRepo::get_by_path(&conn, path).map_err(MaestroError::from)?
        }
        .ok_or_else(|| MaestroError::EndpointNotFound {
            path: path.to_owned(),
        })?;

        if deployment.status != DeploymentStatus::Active {
            return Err(MaestroError::EndpointConflict {
                path: path.to_owned(),
                reason: "deployment is inactive".into(),
            }
            .into());
        }

        self.execute_deployment(&deployment.id, TriggerKind::Api, input, user_id)
            .await
    }

    /// Execute a deployment by id, recording an execution log. Failures
    /// carry the partial event trace captured up to the failure point.
    #[instrument(skip_all, fields(deployment_id, trigger = trigger.as_str()))]
    pub async fn execute_deployment(
        &self,
        deployment_id: &str,
        trigger: TriggerKind,
        input: serde_json::Value,
        user_id: Option<&str>,
    ) -> Result<ExecutionOutcome, DispatchError> {
        let (deployment, design) = {
            let conn = self
                .pool
                .get()
                .map_err(|e| MaestroError::Storage(e.to_string()))?;
            let deployment = DeploymentRepo::get(&conn, deployment_id)
                .map_err(MaestroError::from)?
                .ok_or_else(|| MaestroError::EndpointNotFound {
                    path: deployment_id.to_owned(),
                })?;
            let design =
                DesignRepo::get_definition(&conn, &deployment.design_id).map_err(MaestroError::from)?;
            (deployment, design)
        };

        // Precondition: credentials resolve before anything is recorded.
        let credentials = match user_id {
            Some(user_id) => self.credentials.ensure(user_id).await?,
            None => CredentialMode::Ambient,
        };

        let execution_id = ExecutionId::new();
        let initial_task = initial_task_from(&input);
        let log = {
            let conn = self
                .pool
                .get()
                .map_err(|e| MaestroError::Storage(e.to_string()))?;
            let log = ExecutionLogRepo::start(
                &conn,
                &deployment.id,
                execution_id.as_str(),
                trigger,
                Some(&input.to_string()),
            )
            .map_err(MaestroError::from)?;
            DeploymentRepo::record_execution(&conn, &deployment.id).map_err(MaestroError::from)?;
            log
        };

        let emitter = EventEmitter::new();
        // The collector drains concurrently for the whole run; the ring
        // buffer alone cannot hold a long execution's event stream.
        let collector = collect_trace(emitter.subscribe());
        let opts = ExecuteOptions {
            execution_id: Some(execution_id.clone()),
            workflow_id: None,
            credentials,
            ssh_keys: Vec::new(),
        };
        let started = std::time::Instant::now();
        let result = self
            .engine
            .execute(&design, &initial_task, &opts, &emitter, &CancellationToken::new())
            .await;
        let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        // Closing the channel bounds the collector even if no terminal
        // event was emitted.
        drop(emitter);
        let trace = collector.await.unwrap_or_default();

        let conn = self
            .pool
            .get()
            .map_err(|e| MaestroError::Storage(e.to_string()))?;
        match result {
            Ok(summary) => {
                let result_json = serde_json::json!({ "output": summary.output }).to_string();
                ExecutionLogRepo::finish(
                    &conn,
                    &log.id,
                    ExecutionStatus::Completed,
                    Some(&result_json),
                    None,
                    duration_ms,
                )
                .map_err(MaestroError::from)?;
                info!(deployment_id, execution_id = %execution_id, "deployment executed");
                Ok(ExecutionOutcome {
                    execution_id: execution_id.into_inner(),
                    execution_log_id: log.id,
                    output: summary.output,
                    trace,
                })
            }
            Err(error) => {
                let message = format!("{}: {error}", error.kind());
                if let Err(log_err) = ExecutionLogRepo::finish(
                    &conn,
                    &log.id,
                    ExecutionStatus::Failed,
                    None,
                    Some(&message),
                    duration_ms,
                ) {
                    warn!(error = %log_err, "failed to close execution log");
                }
                // Partial outputs up to the failure point stay visible.
                Err(DispatchError { error, trace })
            }
        }
    }
}

/// Derive the initial task text from a free-form JSON input body.
fn initial_task_from(input: &serde_json::Value) -> String {
    match input {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        serde_json::Value::Object(map) => map
            .get("task")
            .or_else(|| map.get("input"))
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .unwrap_or_else(|| {
                if map.is_empty() {
                    String::new()
                } else {
                    input.to_string()
                }
            }),
        other => other.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use maestro_agent::turn::{TurnRequest, TurnResult};
    use maestro_core::design::{Agent, Block, BlockKind, Design};
    use maestro_engine::TurnExecutor;
    use maestro_store::repositories::deployment::CreateDeploymentOptions;
    use maestro_workspace::WorkspaceProvisioner;

    struct EchoExecutor;

    #[async_trait]
    impl TurnExecutor for EchoExecutor {
        async fn run_turn(&self, req: TurnRequest) -> Result<TurnResult, MaestroError> {
            Ok(TurnResult {
                text: format!("echo:{}", req.input),
                ..Default::default()
            })
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl TurnExecutor for FailingExecutor {
        async fn run_turn(&self, req: TurnRequest) -> Result<TurnResult, MaestroError> {
            Err(MaestroError::AgentFailed {
                agent_name: req.agent.name,
                exit_code: 1,
                stderr_tail: "scripted failure".into(),
            })
        }
    }

    /// Streams far more chunks than the emitter's ring buffer holds.
    struct ChattyExecutor {
        chunks: usize,
    }

    #[async_trait]
    impl TurnExecutor for ChattyExecutor {
        async fn run_turn(&self, req: TurnRequest) -> Result<TurnResult, MaestroError> {
            if let Some(tx) = &req.events {
                for i in 0..self.chunks {
                    let _ = tx.send(maestro_agent::events::CliEvent::Text {
                        text: format!("chunk {i}"),
                    });
                }
            }
            Ok(TurnResult {
                text: "done".into(),
                ..Default::default()
            })
        }
    }

    fn dispatcher_with(executor: Arc<dyn TurnExecutor>) -> (Dispatcher, ConnectionPool) {
        let pool = maestro_store::open_in_memory().unwrap();
        let engine = Arc::new(DesignExecutor::new(
            executor,
            WorkspaceProvisioner::new(std::env::temp_dir().join("maestro-dispatch-tests")),
        ));
        let credentials = Arc::new(CredentialProvider::new(
            pool.clone(),
            std::env::temp_dir().join("maestro-dispatch-creds.json"),
        ));
        (Dispatcher::new(pool.clone(), engine, credentials), pool)
    }

    fn seed_deployment(pool: &ConnectionPool, path: &str, status: DeploymentStatus) -> String {
        let conn = pool.get().unwrap();
        let design = Design::single(
            Block::new("b1", BlockKind::Sequential, "greet").with_agent(Agent::new("A", "p")),
        );
        let design_row = DesignRepo::create(&conn, None, &design).unwrap();
        DeploymentRepo::create(
            &conn,
            &CreateDeploymentOptions {
                design_id: &design_row.id,
                endpoint_path: path,
                status,
                schedule: None,
            },
        )
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn dispatch_executes_and_records_log() {
        // S6: POST to a registered path completes, logs trigger=api, bumps
        // the counter.
        let (dispatcher, pool) = dispatcher_with(Arc::new(EchoExecutor));
        let dep_id = seed_deployment(&pool, "/hello", DeploymentStatus::Active);

        let outcome = dispatcher
            .dispatch_path("/hello", serde_json::json!({}), None)
            .await
            .unwrap();
        assert!(outcome.output.starts_with("echo:"));
        assert!(!outcome.trace.is_empty());

        let conn = pool.get().unwrap();
        let logs = ExecutionLogRepo::list_for_deployment(&conn, &dep_id, 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].trigger, TriggerKind::Api);
        assert_eq!(logs[0].status, ExecutionStatus::Completed);

        let deployment = DeploymentRepo::get(&conn, &dep_id).unwrap().unwrap();
        assert_eq!(deployment.execution_count, 1);
        assert!(deployment.last_execution_at.is_some());
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (dispatcher, _pool) = dispatcher_with(Arc::new(EchoExecutor));
        let err = dispatcher
            .dispatch_path("/ghost", serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert_matches!(err.error, MaestroError::EndpointNotFound { .. });
        assert!(err.trace.is_empty());
    }

    #[tokio::test]
    async fn inactive_deployment_is_conflict() {
        let (dispatcher, pool) = dispatcher_with(Arc::new(EchoExecutor));
        let _ = seed_deployment(&pool, "/off", DeploymentStatus::Inactive);
        let err = dispatcher
            .dispatch_path("/off", serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert_matches!(err.error, MaestroError::EndpointConflict { .. });
    }

    #[tokio::test]
    async fn path_matching_is_exact() {
        let (dispatcher, pool) = dispatcher_with(Arc::new(EchoExecutor));
        let _ = seed_deployment(&pool, "/hello", DeploymentStatus::Active);
        let err = dispatcher
            .dispatch_path("/hello/extra", serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert_matches!(err.error, MaestroError::EndpointNotFound { .. });
    }

    #[tokio::test]
    async fn failed_execution_closes_log_and_keeps_partial_trace() {
        let (dispatcher, pool) = dispatcher_with(Arc::new(FailingExecutor));
        let dep_id = seed_deployment(&pool, "/fails", DeploymentStatus::Active);

        let err = dispatcher
            .execute_deployment(&dep_id, TriggerKind::Manual, serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert_matches!(err.error, MaestroError::AgentFailed { .. });

        // Events up to the failure point travel with the error.
        assert!(
            err.trace
                .iter()
                .any(|e| e.event_type() == "block_started")
        );
        assert_eq!(
            err.trace.last().map(maestro_core::ExecutionEvent::event_type),
            Some("execution_failed")
        );

        let conn = pool.get().unwrap();
        let logs = ExecutionLogRepo::list_for_deployment(&conn, &dep_id, 10).unwrap();
        assert_eq!(logs[0].status, ExecutionStatus::Failed);
        assert!(logs[0].error.as_ref().unwrap().contains("AgentFailed"));
    }

    #[tokio::test]
    async fn trace_survives_runs_longer_than_the_ring_buffer() {
        // A single streamed turn emits far more events than the emitter
        // buffers; the concurrent collector must capture the whole run.
        let chunks = 1500_usize;
        let (dispatcher, pool) = dispatcher_with(Arc::new(ChattyExecutor { chunks }));
        let _ = seed_deployment(&pool, "/chatty", DeploymentStatus::Active);

        let outcome = dispatcher
            .dispatch_path("/chatty", serde_json::json!({}), None)
            .await
            .unwrap();

        assert!(
            outcome.trace.len() > chunks,
            "expected more than {chunks} events, got {}",
            outcome.trace.len()
        );
        assert_eq!(
            outcome.trace.first().map(maestro_core::ExecutionEvent::event_type),
            Some("block_started")
        );
        assert_eq!(
            outcome.trace.last().map(maestro_core::ExecutionEvent::event_type),
            Some("execution_completed")
        );
        let chunk_events = outcome
            .trace
            .iter()
            .filter(|e| e.event_type() == "agent_chunk")
            .count();
        assert_eq!(chunk_events, chunks);
    }

    #[tokio::test]
    async fn distinct_paths_route_to_distinct_deployments() {
        let (dispatcher, pool) = dispatcher_with(Arc::new(EchoExecutor));
        let a = seed_deployment(&pool, "/a", DeploymentStatus::Active);
        let b = seed_deployment(&pool, "/b", DeploymentStatus::Active);

        let _ = dispatcher
            .dispatch_path("/a", serde_json::json!({}), None)
            .await
            .unwrap();

        let conn = pool.get().unwrap();
        assert_eq!(
            DeploymentRepo::get(&conn, &a).unwrap().unwrap().execution_count,
            1
        );
        assert_eq!(
            DeploymentRepo::get(&conn, &b).unwrap().unwrap().execution_count,
            0
        );
    }

    #[test]
    fn initial_task_extraction() {
        assert_eq!(initial_task_from(&serde_json::json!("plain")), "plain");
        assert_eq!(
            initial_task_from(&serde_json::json!({"task": "do it"})),
            "do it"
        );
        assert_eq!(initial_task_from(&serde_json::json!({})), "");
        assert_eq!(initial_task_from(&serde_json::Value::Null), "");
        let passthrough = initial_task_from(&serde_json::json!({"custom": 1}));
        assert!(passthrough.contains("custom"));
    }
}
