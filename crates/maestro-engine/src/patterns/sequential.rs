//! Sequential pattern: agents chain, each consuming its predecessor's text.

use std::collections::BTreeMap;

use maestro_core::MaestroError;

use crate::context::{BlockContext, BlockOutput};

/// Run agents in order; the last agent's text is the block output.
pub async fn run(ctx: &BlockContext<'_>) -> Result<BlockOutput, MaestroError> {
    let mut agent_outputs = BTreeMap::new();
    let mut previous: Option<String> = None;

    for agent in &ctx.block.agents {
        let input = match &previous {
            // The first agent sees the block input (task + upstream context).
            None => ctx.input.for_agent(&agent.name),
            // Later agents see the task plus the previous agent's text.
            Some(prev) => {
                let chained = format!("{}\n\n{prev}", ctx.block.task);
                match ctx.input.per_agent.get(&agent.name) {
                    Some(routed) => format!("{chained}\n\n{routed}"),
                    None => chained,
                }
            }
        };

        let result = ctx.run_agent_turn(agent, input).await?;
        let _ = agent_outputs.insert(agent.name.clone(), result.text.clone());
        previous = Some(result.text);
    }

    Ok(BlockOutput {
        output: previous.unwrap_or_default(),
        agent_outputs,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
