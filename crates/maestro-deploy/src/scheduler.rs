//! The deployment scheduler.
//!
//! One registration (one timer task) per deployment, at most. `start` runs
//! exactly once at service start and scans active scheduled deployments;
//! `shutdown` runs exactly once at service stop and drains in-flight fires
//! with a bounded timeout. Registration mutations are remove-then-add.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use maestro_core::MaestroError;
use maestro_store::ConnectionPool;
use maestro_store::repositories::DeploymentRepo;
use maestro_store::row_types::{DeploymentRow, DeploymentStatus, TriggerKind};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::dispatcher::Dispatcher;
use crate::schedule::Schedule;

/// How long shutdown waits for in-flight fires.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

struct Registration {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Timezone-aware cron/interval scheduler over deployments.
pub struct Scheduler {
    pool: ConnectionPool,
    dispatcher: Arc<Dispatcher>,
    registrations: Mutex<HashMap<String, Registration>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Scheduler {
    /// Build a scheduler.
    #[must_use]
    pub fn new(pool: ConnectionPool, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            pool,
            dispatcher,
            registrations: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Start the scheduler: register every active deployment that carries an
    /// enabled schedule. Second calls are rejected.
    #[instrument(skip_all)]
    pub fn start(self: &Arc<Self>) -> Result<usize, MaestroError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(MaestroError::Internal("scheduler already started".into()));
        }
        let rows = {
            let conn = self
                .pool
                .get()
                .map_err(|e| MaestroError::Storage(e.to_string()))?;
            DeploymentRepo::list_scheduled(&conn).map_err(MaestroError::from)?
        };
        let mut registered = 0;
        for row in rows {
            match self.register(&row) {
                Ok(true) => registered += 1,
                Ok(false) => {}
                Err(e) => warn!(deployment_id = %row.id, error = %e, "startup registration failed"),
            }
        }
        info!(registered, "scheduler started");
        Ok(registered)
    }

    /// Register a deployment's schedule. Remove-then-add: any existing
    /// registration is deregistered first. Returns whether a registration
    /// now exists.
    pub fn register(self: &Arc<Self>, deployment: &DeploymentRow) -> Result<bool, MaestroError> {
        let _ = self.deregister(&deployment.id);

        if deployment.status != DeploymentStatus::Active {
            return Ok(false);
        }
        let Some(schedule_json) = &deployment.schedule else {
            return Ok(false);
        };
        let schedule = Schedule::parse(schedule_json)?;
        if !schedule.is_enabled() {
            return Ok(false);
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Self::fire_loop(
            self.clone(),
            deployment.id.clone(),
            schedule,
            cancel.clone(),
        ));
        let _ = self
            .registrations
            .lock()
            .insert(deployment.id.clone(), Registration { cancel, task });
        info!(deployment_id = %deployment.id, "schedule registered");
        Ok(true)
    }

    /// Remove a deployment's registration. Returns whether one existed.
    pub fn deregister(&self, deployment_id: &str) -> bool {
        if let Some(registration) = self.registrations.lock().remove(deployment_id) {
            registration.cancel.cancel();
            registration.task.abort();
            info!(deployment_id, "schedule deregistered");
            true
        } else {
            false
        }
    }

    /// Whether the deployment currently holds a registration.
    #[must_use]
    pub fn has_registration(&self, deployment_id: &str) -> bool {
        self.registrations.lock().contains_key(deployment_id)
    }

    /// Number of live registrations.
    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.registrations.lock().len()
    }

    /// Shut down: drop all registrations and drain in-flight fires with a
    /// bounded timeout. Second calls are no-ops.
    pub async fn shutdown(&self, drain_timeout: Option<Duration>) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let registrations: Vec<Registration> = {
            let mut map = self.registrations.lock();
            map.drain().map(|(_, r)| r).collect()
        };
        for registration in &registrations {
            registration.cancel.cancel();
            registration.task.abort();
        }

        let in_flight: Vec<JoinHandle<()>> = std::mem::take(&mut *self.in_flight.lock());
        let timeout = drain_timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        if tokio::time::timeout(timeout, futures_join_all(in_flight))
            .await
            .is_err()
        {
            warn!("scheduler drain timed out");
        }
        info!("scheduler stopped");
    }

    async fn fire_loop(
        scheduler: Arc<Self>,
        deployment_id: String,
        schedule: Schedule,
        cancel: CancellationToken,
    ) {
        loop {
            let next = match schedule.next_fire(Utc::now()) {
                Ok(Some(next)) => next,
                Ok(None) => {
                    warn!(deployment_id, "schedule has no future fire; unregistering");
                    return;
                }
                Err(e) => {
                    warn!(deployment_id, error = %e, "schedule evaluation failed");
                    return;
                }
            };
            let wait = (next - Utc::now())
                .to_std()
                .unwrap_or(Duration::from_millis(0));

            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(wait) => {}
            }

            // Fires run on their own task so a slow execution cannot delay
            // the next fire; concurrent executions are permitted.
            let dispatcher = scheduler.dispatcher.clone();
            let id = deployment_id.clone();
            let fire = tokio::spawn(async move {
                match dispatcher
                    .execute_deployment(&id, TriggerKind::Scheduled, serde_json::Value::Null, None)
                    .await
                {
                    Ok(outcome) => {
                        info!(deployment_id = %id, execution_id = %outcome.execution_id, "scheduled fire completed");
                    }
                    // The schedule stays registered after a failed fire.
                    Err(e) => warn!(
                        deployment_id = %id,
                        error = %e.error,
                        trace_events = e.trace.len(),
                        "scheduled fire failed"
                    ),
                }
            });
            let mut in_flight = scheduler.in_flight.lock();
            in_flight.retain(|handle| !handle.is_finished());
            in_flight.push(fire);
        }
    }
}

async fn futures_join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
