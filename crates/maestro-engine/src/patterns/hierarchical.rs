//! Hierarchical pattern: a manager delegates, workers execute concurrently,
//! the manager synthesizes. Optional extra rounds repeat the cycle with the
//! previous synthesis as input.

use std::collections::BTreeMap;

use maestro_core::MaestroError;
use maestro_core::design::{Agent, AgentRole};

use crate::context::{BlockContext, BlockOutput, label_outputs};

fn manager_of<'a>(ctx: &BlockContext<'a>) -> Result<&'a Agent, MaestroError> {
    let name = ctx.block.manager.clone().or_else(|| {
        ctx.block
            .agents
            .iter()
            .find(|a| a.role == AgentRole::Manager)
            .map(|a| a.name.clone())
    });
    name.and_then(|n| ctx.block.agent(&n)).ok_or_else(|| {
        MaestroError::Internal(format!("manager missing at runtime in block {}", ctx.block.id))
    })
}

/// Run delegate → workers → synthesize for `rounds` rounds.
pub async fn run(ctx: &BlockContext<'_>) -> Result<BlockOutput, MaestroError> {
    let manager = manager_of(ctx)?;
    let workers: Vec<_> = ctx
        .block
        .agents
        .iter()
        .filter(|a| a.name != manager.name)
        .collect();
    let rounds = ctx.block.rounds.unwrap_or(1).max(1);

    let mut agent_outputs = BTreeMap::new();
    let mut synthesis: Option<String> = None;

    for _ in 0..rounds {
        let delegation_input = match &synthesis {
            None => ctx.input.for_agent(&manager.name),
            Some(prev) => format!("{}\n\nPrevious synthesis:\n{prev}", ctx.block.task),
        };
        let delegation = ctx.run_agent_turn(manager, delegation_input).await?.text;

        let turns = workers.iter().map(|worker| {
            let input = match ctx.input.per_agent.get(&worker.name) {
                Some(routed) => format!("{delegation}\n\n{routed}"),
                None => delegation.clone(),
            };
            ctx.run_agent_turn(worker, input)
        });
        let results = futures::future::try_join_all(turns).await?;

        let labeled_pairs: Vec<(String, String)> = workers
            .iter()
            .zip(&results)
            .map(|(worker, result)| {
                let _ = agent_outputs.insert(worker.name.clone(), result.text.clone());
                (worker.name.clone(), result.text.clone())
            })
            .collect();

        let synth_input = format!(
            "{}\n\nWorker results:\n{}",
            ctx.block.task,
            label_outputs(&labeled_pairs)
        );
        let result = ctx.run_agent_turn(manager, synth_input).await?;
        let _ = agent_outputs.insert(manager.name.clone(), result.text.clone());
        synthesis = Some(result.text);
    }

    Ok(BlockOutput {
        output: synthesis.unwrap_or_default(),
        agent_outputs,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
