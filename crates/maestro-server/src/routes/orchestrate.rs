//! Single-pattern orchestration: `POST /api/orchestrate/{pattern}`.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::Response;
use maestro_core::MaestroError;
use maestro_core::design::{Agent, Block, BlockKind, Design};
use maestro_core::ids::BlockId;
use maestro_engine::EventEmitter;
use serde::Deserialize;
use tracing::instrument;

use crate::error::ApiError;
use crate::routes::resolve_options;
use crate::server::AppState;
use crate::stream::execution_stream;

/// Request body for pattern invocation.
#[derive(Debug, Deserialize)]
pub struct OrchestrateRequest {
    /// The block task.
    pub task: String,
    /// Agents in pattern order.
    pub agents: Vec<Agent>,
    /// Rounds (debate, hierarchical).
    #[serde(default)]
    pub rounds: Option<u32>,
    /// Aggregator agent name (parallel).
    #[serde(default)]
    pub aggregator: Option<String>,
    /// Manager agent name (hierarchical).
    #[serde(default)]
    pub manager: Option<String>,
    /// Per-agent git clones under the execution temp parent.
    #[serde(default)]
    pub isolate_agent_workspaces: bool,
    /// Repository to clone.
    #[serde(default)]
    pub git_repo: Option<String>,
    /// Branch to check out.
    #[serde(default)]
    pub branch: Option<String>,
    /// Invoking user (credential resolution).
    #[serde(default)]
    pub user_id: Option<String>,
}

fn parse_pattern(pattern: &str) -> Result<BlockKind, MaestroError> {
    match pattern {
        "sequential" => Ok(BlockKind::Sequential),
        "parallel" => Ok(BlockKind::Parallel),
        "hierarchical" => Ok(BlockKind::Hierarchical),
        "debate" => Ok(BlockKind::Debate),
        "routing" => Ok(BlockKind::Routing),
        "reflection" => Ok(BlockKind::Reflection),
        other => Err(MaestroError::Validation(format!(
            "unknown pattern {other}"
        ))),
    }
}

/// Build the block described by the request.
fn build_block(kind: BlockKind, req: &OrchestrateRequest) -> Block {
    let mut block = Block::new(BlockId::new(), kind, req.task.clone());
    block.agents = req.agents.clone();
    block.rounds = req.rounds;
    block.aggregator = req.aggregator.clone();
    block.manager = req.manager.clone();
    block.isolate_agent_workspaces = req.isolate_agent_workspaces;
    block.git_repo = req.git_repo.clone();
    block.branch = req.branch.clone();
    block
}

/// POST /api/orchestrate/{pattern} — run one pattern, stream its events.
#[instrument(skip_all, fields(pattern))]
pub async fn orchestrate(
    State(state): State<AppState>,
    Path(pattern): Path<String>,
    Json(req): Json<OrchestrateRequest>,
) -> Result<Response, ApiError> {
    let kind = parse_pattern(&pattern)?;
    let block = build_block(kind, &req);

    // Validation errors surface before the stream starts.
    let design = Design::single(block);
    design.validate()?;

    let opts = resolve_options(&state, req.user_id.as_deref()).await?;
    let emitter = EventEmitter::new();
    let rx = emitter.subscribe();
    let cancel = state.shutdown.token();
    let engine = state.engine.clone();
    let task = req.task.clone();

    let handle = tokio::spawn(async move {
        let _ = engine
            .execute(&design, &task, &opts, &emitter, &cancel)
            .await;
    });
    state.shutdown.register_task(handle);

    Ok(execution_stream(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(task: &str) -> OrchestrateRequest {
        OrchestrateRequest {
            task: task.into(),
            agents: vec![Agent::new("A", "p")],
            rounds: None,
            aggregator: None,
            manager: None,
            isolate_agent_workspaces: false,
            git_repo: None,
            branch: None,
            user_id: None,
        }
    }

    #[test]
    fn pattern_names_parse() {
        assert_eq!(parse_pattern("sequential").unwrap(), BlockKind::Sequential);
        assert_eq!(parse_pattern("routing").unwrap(), BlockKind::Routing);
        assert!(parse_pattern("pipeline").is_err());
    }

    #[test]
    fn build_block_copies_params() {
        let mut req = request("do it");
        req.rounds = Some(3);
        req.aggregator = Some("Sum".into());
        let block = build_block(BlockKind::Parallel, &req);
        assert_eq!(block.kind, BlockKind::Parallel);
        assert_eq!(block.rounds, Some(3));
        assert_eq!(block.aggregator.as_deref(), Some("Sum"));
        assert_eq!(block.agents.len(), 1);
    }
}
