//! Instance lifecycle manager.
//!
//! Authoritative state lives here; the database row trails it. Transitions
//! are guarded by a per-instance lock, PTY writes by the session's own
//! write lock, and metric updates by the store's row-level update.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use maestro_core::MaestroError;
use maestro_core::ids::ExecutionId;
use maestro_credentials::{AMBIENT_KEY_VAR, CredentialMode, CredentialProvider};
use maestro_store::ConnectionPool;
use maestro_store::repositories::instance::MetricDeltas;
use maestro_store::repositories::{InstanceLogRepo, InstanceRepo, SshKeyRepo};
use maestro_store::row_types::{InstanceLogKind, InstanceRow, InstanceStatus};
use maestro_workspace::{SshKeyMaterial, WorkspaceProvisioner};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::output::{InstanceEvent, OutputPipeline, PipelineHooks};
use crate::pty::PtySession;

/// Subscriber buffer capacity; overflow drops oldest with a `Lagged` notice.
const SUBSCRIBER_CAPACITY: usize = 512;

/// Manager configuration.
#[derive(Clone, Debug)]
pub struct InstanceManagerConfig {
    /// Assistant CLI command.
    pub cli_command: String,
    /// Arguments for interactive sessions.
    pub cli_args: Vec<String>,
    /// Line marker the CLI prints when idle and accepting input.
    pub ready_marker: String,
    /// How long an interrupt may take before the instance is failed.
    pub interrupt_grace: Duration,
    /// Tool-result preview threshold for subscriber events.
    pub tool_result_preview_bytes: usize,
}

impl Default for InstanceManagerConfig {
    fn default() -> Self {
        Self {
            cli_command: "assistant".to_owned(),
            cli_args: Vec::new(),
            ready_marker: "[maestro:ready]".to_owned(),
            interrupt_grace: Duration::from_secs(5),
            tool_result_preview_bytes: 4096,
        }
    }
}

struct HandleState {
    status: InstanceStatus,
    running_since: Option<Instant>,
}

struct InstanceHandle {
    id: String,
    session: PtySession,
    state: Mutex<HandleState>,
    stopping: AtomicBool,
    events: broadcast::Sender<InstanceEvent>,
    /// Per-tool call counts (finer lock than the state lock).
    tool_counts: Mutex<HashMap<String, u64>>,
}

impl InstanceHandle {
    fn status(&self) -> InstanceStatus {
        self.state.lock().status
    }

    /// Apply a transition under the state lock; rejects invalid moves and
    /// persists the new status plus any accumulated running time.
    fn transition(&self, pool: &ConnectionPool, to: InstanceStatus) -> Result<(), MaestroError> {
        let running_delta_ms = {
            let mut state = self.state.lock();
            let from = state.status;
            if !is_valid_transition(from, to) {
                return Err(MaestroError::Instance {
                    instance_id: self.id.clone(),
                    operation: "transition".into(),
                    message: format!("invalid transition {} -> {}", from.as_str(), to.as_str()),
                });
            }
            let delta = if from == InstanceStatus::Running && to != InstanceStatus::Running {
                state
                    .running_since
                    .take()
                    .map(|since| i64::try_from(since.elapsed().as_millis()).unwrap_or(i64::MAX))
            } else {
                None
            };
            if to == InstanceStatus::Running {
                state.running_since = Some(Instant::now());
            }
            state.status = to;
            delta
        };

        let conn = pool.get().map_err(|e| MaestroError::Storage(e.to_string()))?;
        InstanceRepo::set_status(&conn, &self.id, to).map_err(MaestroError::from)?;
        if let Some(running_ms) = running_delta_ms {
            InstanceRepo::apply_metrics(
                &conn,
                &self.id,
                &MetricDeltas {
                    running_ms,
                    ..Default::default()
                },
            )
            .map_err(MaestroError::from)?;
        }
        Ok(())
    }
}

fn is_valid_transition(from: InstanceStatus, to: InstanceStatus) -> bool {
    use InstanceStatus::{Failed, Interrupted, Ready, Running, Starting, Stopped};
    match (from, to) {
        (Starting, Ready | Failed | Stopped)
        | (Ready, Running | Ready | Stopped | Failed)
        | (Running, Ready | Interrupted | Stopped | Failed)
        | (Interrupted, Ready | Stopped | Failed) => true,
        _ => false,
    }
}

/// Manages long-lived PTY-attached CLI instances.
pub struct InstanceManager {
    config: InstanceManagerConfig,
    pool: ConnectionPool,
    credentials: Arc<CredentialProvider>,
    provisioner: WorkspaceProvisioner,
    instances: DashMap<String, Arc<InstanceHandle>>,
}

impl InstanceManager {
    /// Build a manager.
    #[must_use]
    pub fn new(
        config: InstanceManagerConfig,
        pool: ConnectionPool,
        credentials: Arc<CredentialProvider>,
        provisioner: WorkspaceProvisioner,
    ) -> Self {
        Self {
            config,
            pool,
            credentials,
            provisioner,
            instances: DashMap::new(),
        }
    }

    /// Spawn a new instance for `(workflow_id, user_id)`.
    ///
    /// Provisions a shared workspace (clone when `git_repo` is given),
    /// resolves credentials, forks the CLI on a PTY, and starts the output
    /// pipeline. The instance reaches `ready` when the CLI emits its ready
    /// marker.
    #[instrument(skip_all, fields(workflow_id, user_id))]
    pub async fn spawn(
        &self,
        workflow_id: &str,
        user_id: &str,
        git_repo: Option<&str>,
    ) -> Result<InstanceRow, MaestroError> {
        let credentials = self.credentials.ensure(user_id).await?;

        let (row, ssh_keys) = {
            let conn = self
                .pool
                .get()
                .map_err(|e| MaestroError::Storage(e.to_string()))?;
            let row = InstanceRepo::create(&conn, workflow_id, user_id, None)
                .map_err(MaestroError::from)?;
            let ssh_keys: Vec<SshKeyMaterial> = SshKeyRepo::list_for_user(&conn, user_id)
                .map_err(MaestroError::from)?
                .into_iter()
                .map(|key| SshKeyMaterial {
                    name: key.key_name,
                    private_key: key.private_key,
                    public_key: key.public_key,
                })
                .collect();
            (row, ssh_keys)
        };
        let scope = ExecutionId::from(row.id.clone());

        let workspace = self
            .provisioner
            .provision_shared(git_repo, None, &scope, &ssh_keys)
            .await?;

        let mut env = HashMap::new();
        if let CredentialMode::ApiKey(key) = &credentials {
            let _ = env.insert(AMBIENT_KEY_VAR.to_owned(), key.clone());
        }

        // Profile mode: the spawn must not interleave with another profile
        // write. The lock covers materialization (done in ensure) + fork.
        let session = if credentials.requires_profile_lock() {
            let _guard = self.credentials.profile_guard().await;
            PtySession::spawn(
                &self.config.cli_command,
                &self.config.cli_args,
                Some(&workspace.path),
                &env,
            )?
        } else {
            PtySession::spawn(
                &self.config.cli_command,
                &self.config.cli_args,
                Some(&workspace.path),
                &env,
            )?
        };

        {
            let conn = self
                .pool
                .get()
                .map_err(|e| MaestroError::Storage(e.to_string()))?;
            let _ = conn
                .execute(
                    "UPDATE instances SET workspace_path = ?1 WHERE id = ?2",
                    rusqlite::params![workspace.path.to_string_lossy().into_owned(), row.id],
                )
                .map_err(|e| MaestroError::Storage(e.to_string()))?;
        }

        let (events_tx, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        let handle = Arc::new(InstanceHandle {
            id: row.id.clone(),
            session,
            state: Mutex::new(HandleState {
                status: InstanceStatus::Starting,
                running_since: None,
            }),
            stopping: AtomicBool::new(false),
            events: events_tx.clone(),
            tool_counts: Mutex::new(HashMap::new()),
        });
        let _ = self.instances.insert(row.id.clone(), handle.clone());

        let output = handle
            .session
            .take_output()
            .ok_or_else(|| MaestroError::Internal("pty output already taken".into()))?;

        let pipeline = OutputPipeline {
            instance_id: row.id.clone(),
            pool: self.pool.clone(),
            events_tx,
            ready_marker: self.config.ready_marker.clone(),
            tool_result_preview_bytes: self.config.tool_result_preview_bytes,
            hooks: self.hooks_for(&handle),
        };
        let _ = tokio::spawn(pipeline.run(output));

        info!(instance_id = %row.id, "instance spawned");
        Ok(row)
    }

    fn hooks_for(&self, handle: &Arc<InstanceHandle>) -> PipelineHooks {
        let ready_handle = handle.clone();
        let ready_pool = self.pool.clone();
        let eof_handle = handle.clone();
        let eof_pool = self.pool.clone();
        let count_handle = handle.clone();

        PipelineHooks {
            on_ready_marker: Box::new(move || {
                // starting → ready, running → ready, interrupted → ready
                if let Err(e) = ready_handle.transition(&ready_pool, InstanceStatus::Ready) {
                    warn!(instance_id = %ready_handle.id, error = %e, "ready transition rejected");
                }
            }),
            on_eof: Box::new(move || {
                let target = if eof_handle.stopping.load(Ordering::SeqCst) {
                    InstanceStatus::Stopped
                } else {
                    InstanceStatus::Failed
                };
                if eof_handle.status().is_live() {
                    if let Err(e) = eof_handle.transition(&eof_pool, target) {
                        warn!(instance_id = %eof_handle.id, error = %e, "eof transition rejected");
                    }
                }
            }),
            on_tool_call: Box::new(move |name| {
                *count_handle
                    .tool_counts
                    .lock()
                    .entry(name.to_owned())
                    .or_insert(0) += 1;
            }),
        }
    }

    fn handle(&self, instance_id: &str) -> Result<Arc<InstanceHandle>, MaestroError> {
        self.instances
            .get(instance_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| MaestroError::Instance {
                instance_id: instance_id.to_owned(),
                operation: "lookup".into(),
                message: "unknown instance".into(),
            })
    }

    /// Write text to the instance's PTY. `ready → running` on first write.
    pub fn send(&self, instance_id: &str, text: &str) -> Result<(), MaestroError> {
        let handle = self.handle(instance_id)?;
        match handle.status() {
            InstanceStatus::Ready => {
                handle.transition(&self.pool, InstanceStatus::Running)?;
            }
            InstanceStatus::Running => {}
            other => {
                return Err(MaestroError::Instance {
                    instance_id: instance_id.to_owned(),
                    operation: "send".into(),
                    message: format!("not accepting input in status {}", other.as_str()),
                });
            }
        }
        handle.session.write(text)?;
        if !text.ends_with('\n') {
            handle.session.write("\n")?;
        }
        Ok(())
    }

    /// Interrupt the instance; if it does not quiesce within the grace
    /// window, it is terminated and transitions to `failed`.
    pub async fn interrupt(&self, instance_id: &str) -> Result<(), MaestroError> {
        let handle = self.handle(instance_id)?;
        if handle.status() != InstanceStatus::Running {
            return Err(MaestroError::Instance {
                instance_id: instance_id.to_owned(),
                operation: "interrupt".into(),
                message: "instance is not running".into(),
            });
        }
        handle.session.interrupt()?;
        handle.transition(&self.pool, InstanceStatus::Interrupted)?;

        // Watchdog: the pipeline flips interrupted → ready on the next ready
        // marker; past the grace window we terminate.
        let pool = self.pool.clone();
        let grace = self.config.interrupt_grace;
        let watchdog = handle.clone();
        let _ = tokio::spawn(async move {
            let deadline = Instant::now() + grace;
            while Instant::now() < deadline {
                if watchdog.status() != InstanceStatus::Interrupted {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            warn!(instance_id = %watchdog.id, "interrupt grace expired; terminating");
            watchdog.session.kill();
            if let Err(e) = watchdog.transition(&pool, InstanceStatus::Failed) {
                warn!(instance_id = %watchdog.id, error = %e, "failed transition rejected");
            }
        });
        Ok(())
    }

    /// Stop the instance and clean its workspace.
    pub async fn stop(&self, instance_id: &str) -> Result<(), MaestroError> {
        let handle = self.handle(instance_id)?;
        handle.stopping.store(true, Ordering::SeqCst);
        handle.session.kill();
        if handle.status().is_live() {
            handle.transition(&self.pool, InstanceStatus::Stopped)?;
        }
        self.flush_tool_counts(&handle);
        self.provisioner
            .cleanup(&ExecutionId::from(instance_id.to_owned()))
            .await;
        info!(instance_id, "instance stopped");
        Ok(())
    }

    /// Authoritative in-memory status.
    pub fn status(&self, instance_id: &str) -> Result<InstanceStatus, MaestroError> {
        Ok(self.handle(instance_id)?.status())
    }

    /// Whether the manager owns a live subprocess for this instance.
    pub fn has_live_subprocess(&self, instance_id: &str) -> bool {
        self.instances
            .get(instance_id)
            .is_some_and(|handle| handle.session.is_alive())
    }

    /// Number of instances currently holding a live subprocess.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.instances
            .iter()
            .filter(|entry| entry.session.is_alive())
            .count()
    }

    /// Subscribe to the instance's event stream.
    ///
    /// The channel is bounded; a slow subscriber loses oldest events and
    /// observes a single `Lagged` notice rather than blocking the reader.
    pub fn subscribe(
        &self,
        instance_id: &str,
    ) -> Result<broadcast::Receiver<InstanceEvent>, MaestroError> {
        Ok(self.handle(instance_id)?.events.subscribe())
    }

    /// In-memory per-tool call counts.
    pub fn tool_counts(&self, instance_id: &str) -> Result<HashMap<String, u64>, MaestroError> {
        Ok(self.handle(instance_id)?.tool_counts.lock().clone())
    }

    /// Persisted instance row.
    pub fn get(&self, instance_id: &str) -> Result<Option<InstanceRow>, MaestroError> {
        let conn = self
            .pool
            .get()
            .map_err(|e| MaestroError::Storage(e.to_string()))?;
        InstanceRepo::get(&conn, instance_id).map_err(MaestroError::from)
    }

    /// Persisted instances for a workflow.
    pub fn list_for_workflow(
        &self,
        workflow_id: &str,
        status: Option<InstanceStatus>,
    ) -> Result<Vec<InstanceRow>, MaestroError> {
        let conn = self
            .pool
            .get()
            .map_err(|e| MaestroError::Storage(e.to_string()))?;
        InstanceRepo::list_for_workflow(&conn, workflow_id, status).map_err(MaestroError::from)
    }

    /// Flush in-memory tool counts into the instance log as a system note.
    fn flush_tool_counts(&self, handle: &InstanceHandle) {
        let counts = handle.tool_counts.lock().clone();
        if counts.is_empty() {
            return;
        }
        let payload = serde_json::json!({ "tool_counts": counts });
        if let Ok(conn) = self.pool.get() {
            if let Err(e) = InstanceLogRepo::append(
                &conn,
                &handle.id,
                InstanceLogKind::System,
                Some(&payload.to_string()),
                0,
                0.0,
            ) {
                warn!(instance_id = %handle.id, error = %e, "tool count flush failed");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
