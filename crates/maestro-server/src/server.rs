//! `MaestroServer` — wiring and the Axum router.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use maestro_core::MaestroError;
use maestro_credentials::CredentialProvider;
use maestro_deploy::{DeploymentService, Dispatcher, Scheduler};
use maestro_engine::{CliTurnExecutor, DesignExecutor};
use maestro_agent::mcp::McpEndpoint;
use maestro_agent::runner::CliAgentRunner;
use maestro_instance::{InstanceManager, InstanceManagerConfig};
use maestro_store::{ConnectionConfig, ConnectionPool, run_migrations};
use maestro_workspace::WorkspaceProvisioner;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::routes;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database pool.
    pub pool: ConnectionPool,
    /// Credential provider.
    pub credentials: Arc<CredentialProvider>,
    /// Design DAG executor.
    pub engine: Arc<DesignExecutor>,
    /// Deployment dispatcher.
    pub dispatcher: Arc<Dispatcher>,
    /// Deployment CRUD service.
    pub deployments: Arc<DeploymentService>,
    /// Schedule registry.
    pub scheduler: Arc<Scheduler>,
    /// Instance manager.
    pub instances: Arc<InstanceManager>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
}

/// The assembled control plane.
pub struct MaestroServer {
    state: AppState,
}

impl MaestroServer {
    /// Wire every subsystem from configuration.
    pub fn new(config: ServerConfig) -> Result<Self, MaestroError> {
        let pool = if config.db_path == ":memory:" {
            maestro_store::new_in_memory(&ConnectionConfig {
                pool_size: 1,
                ..ConnectionConfig::default()
            })
        } else {
            maestro_store::new_file(&config.db_path, &ConnectionConfig::default())
        }
        .map_err(|e| MaestroError::Storage(e.to_string()))?;
        {
            let conn = pool
                .get()
                .map_err(|e| MaestroError::Storage(e.to_string()))?;
            run_migrations(&conn).map_err(MaestroError::from)?;
        }

        let credentials = Arc::new(CredentialProvider::new(
            pool.clone(),
            config.credentials_file.clone(),
        ));
        let provisioner = WorkspaceProvisioner::new(config.temp_root.clone());

        let mut runner = CliAgentRunner::new(config.cli_command.clone(), config.cli_args.clone())
            .with_turn_timeout(Duration::from_secs(config.turn_timeout_secs));
        if let Some(mcp_command) = &config.mcp_command {
            runner = runner.with_mcp(McpEndpoint {
                command: mcp_command.clone(),
                args: config.mcp_args.clone(),
            });
        }
        let turn_executor = Arc::new(CliTurnExecutor::new(runner, credentials.clone()));
        let engine = Arc::new(DesignExecutor::new(turn_executor, provisioner.clone()));

        let dispatcher = Arc::new(Dispatcher::new(
            pool.clone(),
            engine.clone(),
            credentials.clone(),
        ));
        let scheduler = Arc::new(Scheduler::new(pool.clone(), dispatcher.clone()));
        let deployments = Arc::new(DeploymentService::new(pool.clone(), scheduler.clone()));

        let instances = Arc::new(InstanceManager::new(
            InstanceManagerConfig {
                cli_command: config.cli_command.clone(),
                cli_args: config.cli_args.clone(),
                ready_marker: config.ready_marker.clone(),
                ..InstanceManagerConfig::default()
            },
            pool.clone(),
            credentials.clone(),
            provisioner,
        ));

        Ok(Self {
            state: AppState {
                pool,
                credentials,
                engine,
                dispatcher,
                deployments,
                scheduler,
                instances,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                config: Arc::new(config),
                start_time: Instant::now(),
            },
        })
    }

    /// The shared state (tests drive the router directly through it).
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Start the scheduler exactly once.
    pub fn start_scheduler(&self) -> Result<usize, MaestroError> {
        self.state.scheduler.start()
    }

    /// Build the router with all routes and middleware.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Bind and serve. Returns the bound address and the server task.
    #[instrument(skip_all, fields(host = %self.state.config.host, port = self.state.config.port))]
    pub async fn listen(
        &self,
    ) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let bound_addr = listener.local_addr()?;
        info!(addr = %bound_addr, "server started");

        let router = self.router();
        let shutdown_token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_token.cancelled().await;
                    info!("server shutdown initiated");
                })
                .await;
            info!("server shutdown complete");
        });
        Ok((bound_addr, handle))
    }

    /// Graceful stop: scheduler drain, in-flight executions, then tasks.
    pub async fn stop(&self, timeout: Option<Duration>) {
        self.state.scheduler.shutdown(timeout).await;
        self.state.shutdown.graceful_shutdown(timeout).await;
    }
}

/// Assemble the router over an existing state.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/orchestrate/{pattern}", post(routes::orchestrate::orchestrate))
        .route("/api/designs", post(routes::designs::create).get(routes::designs::list))
        .route("/api/designs/validate", post(routes::designs::validate))
        .route("/api/designs/execute", post(routes::designs::execute))
        .route("/api/designs/{id}", get(routes::designs::get))
        .route(
            "/api/deployments",
            post(routes::deployments::create).get(routes::deployments::list),
        )
        .route(
            "/api/deployments/{id}",
            get(routes::deployments::get)
                .put(routes::deployments::update)
                .delete(routes::deployments::delete),
        )
        .route("/api/deployments/{id}/execute", post(routes::deployments::execute))
        .route("/api/deployments/{id}/logs", get(routes::deployments::logs))
        .route("/api/deployed/{*path}", post(routes::deployed::dispatch))
        .route("/api/workspaces/browse", get(routes::workspaces::browse))
        .route("/api/workspaces/file", get(routes::workspaces::file))
        .route(
            "/api/instances",
            post(routes::instances::spawn).get(routes::instances::list),
        )
        .route("/api/instances/{id}", get(routes::instances::get))
        .route("/api/instances/{id}/send", post(routes::instances::send))
        .route("/api/instances/{id}/interrupt", post(routes::instances::interrupt))
        .route("/api/instances/{id}/stop", post(routes::instances::stop))
        .route("/api/instances/{id}/events", get(routes::instances::events))
        .with_state(state)
        // Outermost layers run first on the way in.
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(4 * 1024 * 1024))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.scheduler.registration_count(),
        state.instances.live_count(),
    ))
}
