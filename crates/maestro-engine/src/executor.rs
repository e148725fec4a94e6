//! The turn-execution seam.
//!
//! Pattern executors call [`TurnExecutor::run_turn`]; production wires in
//! [`CliTurnExecutor`] (assistant CLI subprocess, profile-lock aware), tests
//! wire in scripted executors.

use std::sync::Arc;

use async_trait::async_trait;
use maestro_agent::runner::CliAgentRunner;
use maestro_agent::turn::{TurnRequest, TurnResult};
use maestro_core::MaestroError;
use maestro_credentials::CredentialProvider;

/// Executes one agent turn.
#[async_trait]
pub trait TurnExecutor: Send + Sync {
    /// Run the turn to completion.
    async fn run_turn(&self, req: TurnRequest) -> Result<TurnResult, MaestroError>;
}

/// Production executor: assistant CLI subprocess per turn.
///
/// Profile-mode turns hold the provider's process-wide lock across the
/// spawn-and-wait so concurrent requests for different user profiles cannot
/// interleave on the shared credentials file. API-key turns skip the lock.
pub struct CliTurnExecutor {
    runner: CliAgentRunner,
    credentials: Arc<CredentialProvider>,
}

impl CliTurnExecutor {
    /// Wrap a runner and the credential provider that guards profile mode.
    #[must_use]
    pub fn new(runner: CliAgentRunner, credentials: Arc<CredentialProvider>) -> Self {
        Self {
            runner,
            credentials,
        }
    }
}

#[async_trait]
impl TurnExecutor for CliTurnExecutor {
    async fn run_turn(&self, req: TurnRequest) -> Result<TurnResult, MaestroError> {
        if req.credentials.requires_profile_lock() {
            let _guard = self.credentials.profile_guard().await;
            self.runner.run_turn(req).await
        } else {
            self.runner.run_turn(req).await
        }
    }
}
