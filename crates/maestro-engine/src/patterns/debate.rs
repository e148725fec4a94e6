//! Debate pattern: debaters alternate for a number of rounds; an optional
//! moderator summarizes the full transcript.

use std::collections::BTreeMap;

use maestro_core::MaestroError;
use maestro_core::design::AgentRole;

use crate::context::{BlockContext, BlockOutput};

fn format_transcript(rounds: &[Vec<(String, String)>]) -> String {
    let mut lines = Vec::new();
    for (i, round) in rounds.iter().enumerate() {
        for (name, text) in round {
            lines.push(format!("Round {} — {name}: {text}", i + 1));
        }
    }
    lines.join("\n\n")
}

/// Run the debate; block output is the moderator's text if present, else the
/// formatted transcript.
pub async fn run(ctx: &BlockContext<'_>) -> Result<BlockOutput, MaestroError> {
    let moderator = ctx
        .block
        .agents
        .iter()
        .find(|a| a.role == AgentRole::Moderator);
    let debaters: Vec<_> = ctx
        .block
        .agents
        .iter()
        .filter(|a| a.role != AgentRole::Moderator)
        .collect();
    let total_rounds = ctx.block.rounds.unwrap_or(1).max(1);

    let mut agent_outputs = BTreeMap::new();
    let mut rounds: Vec<Vec<(String, String)>> = Vec::with_capacity(total_rounds as usize);

    for _ in 0..total_rounds {
        let prior_round = rounds.last().cloned();
        let mut this_round = Vec::with_capacity(debaters.len());

        for debater in &debaters {
            let mut input = ctx.input.for_agent(&debater.name);
            if let Some(prior) = &prior_round {
                let utterances = prior
                    .iter()
                    .map(|(name, text)| format!("{name}: {text}"))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                input = format!("{input}\n\nPrevious round:\n{utterances}");
            }
            let result = ctx.run_agent_turn(debater, input).await?;
            let _ = agent_outputs.insert(debater.name.clone(), result.text.clone());
            this_round.push((debater.name.clone(), result.text));
        }
        rounds.push(this_round);
    }

    let transcript = format_transcript(&rounds);
    let output = match moderator {
        Some(moderator) => {
            let input = format!(
                "{}\n\nFull transcript:\n{transcript}",
                ctx.input.for_agent(&moderator.name)
            );
            let result = ctx.run_agent_turn(moderator, input).await?;
            let _ = agent_outputs.insert(moderator.name.clone(), result.text.clone());
            result.text
        }
        None => transcript,
    };

    Ok(BlockOutput {
        output,
        agent_outputs,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::design::{Agent, Block, BlockKind};

    use crate::context::BlockInput;
    use crate::patterns::harness::Fixture;
    use crate::testutil::ScriptedExecutor;

    fn debate_block(rounds: u32, with_moderator: bool) -> Block {
        let mut block = Block::new("b1", BlockKind::Debate, "Tabs or spaces?")
            .with_agent(Agent::new("Pro", "argue for"))
            .with_agent(Agent::new("Con", "argue against"));
        if with_moderator {
            block = block
                .with_agent(Agent::new("Judge", "summarize").with_role(AgentRole::Moderator));
        }
        block.rounds = Some(rounds);
        block
    }

    #[tokio::test]
    async fn single_round_without_moderator_is_transcript() {
        let exec = ScriptedExecutor::table(&[("Pro", "tabs!"), ("Con", "spaces!")]);
        let fixture = Fixture::new();
        let block = debate_block(1, false);
        let ctx = fixture.ctx(&block, BlockInput::base_only(&block.task), &exec);

        let output = run(&ctx).await.unwrap();
        assert_eq!(
            output.output,
            "Round 1 — Pro: tabs!\n\nRound 1 — Con: spaces!"
        );
    }

    #[tokio::test]
    async fn second_round_sees_prior_round_utterances() {
        let exec = ScriptedExecutor::table(&[("Pro", "tabs!"), ("Con", "spaces!")]);
        let fixture = Fixture::new();
        let block = debate_block(2, false);
        let ctx = fixture.ctx(&block, BlockInput::base_only(&block.task), &exec);

        let _ = run(&ctx).await.unwrap();
        let pro_inputs = exec.inputs_for("Pro");
        assert_eq!(pro_inputs.len(), 2);
        assert!(!pro_inputs[0].contains("Previous round:"));
        assert!(pro_inputs[1].contains("Previous round:"));
        assert!(pro_inputs[1].contains("Con: spaces!"));
    }

    #[tokio::test]
    async fn moderator_runs_once_over_full_transcript() {
        let exec = ScriptedExecutor::new(|agent, input| {
            Ok(match agent {
                "Judge" => {
                    assert!(input.contains("Full transcript:"));
                    assert!(input.contains("Round 2"));
                    "verdict: spaces".to_owned()
                }
                _ => format!("{agent} says"),
            })
        });
        let fixture = Fixture::new();
        let block = debate_block(2, true);
        let ctx = fixture.ctx(&block, BlockInput::base_only(&block.task), &exec);

        let output = run(&ctx).await.unwrap();
        assert_eq!(output.output, "verdict: spaces");
        let judge_calls = exec.inputs_for("Judge");
        assert_eq!(judge_calls.len(), 1);
    }

    #[tokio::test]
    async fn debaters_alternate_in_definition_order() {
        let exec = ScriptedExecutor::table(&[("Pro", "a"), ("Con", "b")]);
        let fixture = Fixture::new();
        let block = debate_block(2, false);
        let ctx = fixture.ctx(&block, BlockInput::base_only(&block.task), &exec);

        let _ = run(&ctx).await.unwrap();
        assert_eq!(exec.call_order(), vec!["Pro", "Con", "Pro", "Con"]);
    }
}
