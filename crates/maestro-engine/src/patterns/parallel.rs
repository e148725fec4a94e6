//! Parallel pattern: workers run concurrently; an optional aggregator
//! synthesizes their labeled outputs.

use std::collections::BTreeMap;

use maestro_core::MaestroError;

use crate::context::{BlockContext, BlockOutput, label_outputs};

/// Run all workers concurrently with the same input; aggregate if configured.
pub async fn run(ctx: &BlockContext<'_>) -> Result<BlockOutput, MaestroError> {
    let aggregator_name = ctx.block.aggregator.as_ref();
    let workers: Vec<_> = ctx
        .block
        .agents
        .iter()
        .filter(|a| Some(&a.name) != aggregator_name)
        .collect();

    let turns = workers
        .iter()
        .map(|agent| ctx.run_agent_turn(agent, ctx.input.for_agent(&agent.name)));
    let results = futures::future::try_join_all(turns).await?;

    let mut agent_outputs = BTreeMap::new();
    let labeled_pairs: Vec<(String, String)> = workers
        .iter()
        .zip(&results)
        .map(|(agent, result)| {
            let _ = agent_outputs.insert(agent.name.clone(), result.text.clone());
            (agent.name.clone(), result.text.clone())
        })
        .collect();
    let labeled = label_outputs(&labeled_pairs);

    let output = match aggregator_name {
        Some(name) => {
            // Existence is a validation invariant.
            let aggregator = ctx.block.agent(name).ok_or_else(|| {
                MaestroError::Internal(format!("aggregator {name} missing at runtime"))
            })?;
            let input = format!("{}\n\n{labeled}", ctx.block.task);
            let result = ctx.run_agent_turn(aggregator, input).await?;
            let _ = agent_outputs.insert(name.clone(), result.text.clone());
            result.text
        }
        None => labeled,
    };

    Ok(BlockOutput {
        output,
        agent_outputs,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
