//! Dynamic routing pattern: a router picks specialists via a JSON decision;
//! selected specialists run in parallel.

use std::collections::BTreeMap;

use maestro_core::MaestroError;
use maestro_core::design::AgentRole;
use serde::Deserialize;

use crate::context::{BlockContext, BlockOutput, label_outputs};

/// The router's required decision shape.
#[derive(Debug, Deserialize)]
struct RoutingDecision {
    selected_agents: Vec<String>,
    #[serde(default)]
    reasoning: String,
}

/// Parse a decision from router output, tolerating surrounding prose or
/// code fences by scanning for the outermost JSON object.
fn parse_decision(text: &str) -> Option<RoutingDecision> {
    let trimmed = text.trim();
    if let Ok(decision) = serde_json::from_str::<RoutingDecision>(trimmed) {
        return Some(decision);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

/// Run the router (with one re-prompt on malformed output), then the
/// selected specialists in parallel.
pub async fn run(ctx: &BlockContext<'_>) -> Result<BlockOutput, MaestroError> {
    let specialists: Vec<_> = ctx
        .block
        .agents
        .iter()
        .filter(|a| a.role == AgentRole::Specialist)
        .collect();
    let router = ctx
        .block
        .agents
        .iter()
        .find(|a| a.role != AgentRole::Specialist)
        .ok_or_else(|| MaestroError::Internal("router missing at runtime".into()))?;

    let specialist_names = specialists
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let base_input = format!(
        "{}\n\nAvailable specialists: {specialist_names}\nRespond with only JSON: \
         {{\"selected_agents\": [\"name\"], \"reasoning\": \"...\"}}",
        ctx.input.for_agent(&router.name)
    );

    let mut decision = None;
    for attempt in 0..2 {
        let input = if attempt == 0 {
            base_input.clone()
        } else {
            format!(
                "Your previous output did not parse; respond with only JSON matching this \
                 schema: {{\"selected_agents\": [\"name\"], \"reasoning\": \"...\"}}\n\n{base_input}"
            )
        };
        let text = ctx.run_agent_turn(router, input).await?.text;
        if let Some(parsed) = parse_decision(&text) {
            decision = Some(parsed);
            break;
        }
    }
    let decision = decision.ok_or_else(|| MaestroError::RoutingUndecided {
        agent_name: router.name.clone(),
    })?;

    let selected: Vec<_> = specialists
        .iter()
        .filter(|a| decision.selected_agents.contains(&a.name))
        .collect();
    if selected.is_empty() {
        return Err(MaestroError::RoutingUndecided {
            agent_name: router.name.clone(),
        });
    }

    let turns = selected
        .iter()
        .map(|agent| ctx.run_agent_turn(agent, ctx.input.for_agent(&agent.name)));
    let results = futures::future::try_join_all(turns).await?;

    let mut agent_outputs = BTreeMap::new();
    let labeled_pairs: Vec<(String, String)> = selected
        .iter()
        .zip(&results)
        .map(|(agent, result)| {
            let _ = agent_outputs.insert(agent.name.clone(), result.text.clone());
            (agent.name.clone(), result.text.clone())
        })
        .collect();

    let output = format!(
        "Routing note: {}\n\n{}",
        decision.reasoning,
        label_outputs(&labeled_pairs)
    );

    Ok(BlockOutput {
        output,
        agent_outputs,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
