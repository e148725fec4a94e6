//! Reflection pattern: a single reflector analyzes the enclosing design and
//! returns prompt-edit suggestions. The engine never applies them.

use std::collections::BTreeMap;

use maestro_core::MaestroError;

use crate::context::{BlockContext, BlockOutput};

const SUGGESTION_SCHEMA: &str = r#"{"suggestions":[{"block_id":"...","agent_id":"...","agent_name":"...","current_prompt":"...","suggested_prompt":"...","reasoning":"..."}]}"#;

/// Run the reflector over the design summary; block output is its suggestion
/// JSON (pretty-printed when it parses, verbatim otherwise).
pub async fn run(ctx: &BlockContext<'_>) -> Result<BlockOutput, MaestroError> {
    let reflector = ctx
        .block
        .agents
        .first()
        .ok_or_else(|| MaestroError::Internal("reflection block without agent".into()))?;

    let summary = ctx
        .design_summary
        .clone()
        .unwrap_or_else(|| ctx.input.base.clone());
    let input = format!("{summary}\n\nReturn JSON only, matching: {SUGGESTION_SCHEMA}");

    let result = ctx.run_agent_turn(reflector, input).await?;

    let output = match serde_json::from_str::<serde_json::Value>(result.text.trim()) {
        Ok(value) if value.get("suggestions").is_some() => {
            serde_json::to_string_pretty(&value).unwrap_or(result.text.clone())
        }
        _ => result.text.clone(),
    };

    let mut agent_outputs = BTreeMap::new();
    let _ = agent_outputs.insert(reflector.name.clone(), result.text);

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
    use maestro_core::design::{Agent, AgentRole, Block, BlockKind};

    use crate::context::BlockInput;
    use crate::patterns::harness::Fixture;
    use crate::testutil::ScriptedExecutor;

    fn reflection_block() -> Block {
        Block::new("r1", BlockKind::Reflection, "improve the prompts").with_agent(
            Agent::new("Reflector", "suggest prompt edits").with_role(AgentRole::Reflector),
        )
    }

    #[tokio::test]
    async fn reflector_sees_design_summary() {
        let exec = ScriptedExecutor::new(|_, input| {
            assert!(input.contains("Design under review"));
            assert!(input.contains("Return JSON only"));
            Ok(r#"{"suggestions":[]}"#.to_owned())
        });
        let fixture = Fixture::new();
        let block = reflection_block();
        let mut ctx = fixture.ctx(&block, BlockInput::base_only(&block.task), &exec);
        ctx.design_summary = Some("Design under review: 2 blocks".to_owned());

        let output = run(&ctx).await.unwrap();
        assert!(output.output.contains("suggestions"));
    }

    #[tokio::test]
    async fn valid_suggestions_are_pretty_printed() {
        let exec = ScriptedExecutor::new(|_, _| {
            Ok(r#"{"suggestions":[{"block_id":"b1","agent_id":"a1","agent_name":"A","current_prompt":"old","suggested_prompt":"new","reasoning":"clearer"}]}"#.to_owned())
        });
        let fixture = Fixture::new();
        let block = reflection_block();
        let ctx = fixture.ctx(&block, BlockInput::base_only(&block.task), &exec);

        let output = run(&ctx).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output.output).unwrap();
        assert_eq!(parsed["suggestions"][0]["suggested_prompt"], "new");
    }

    #[tokio::test]
    async fn non_json_output_is_returned_verbatim() {
        let exec = ScriptedExecutor::new(|_, _| Ok("no structured ideas".to_owned()));
        let fixture = Fixture::new();
        let block = reflection_block();
        let ctx = fixture.ctx(&block, BlockInput::base_only(&block.task), &exec);

        let output = run(&ctx).await.unwrap();
        assert_eq!(output.output, "no structured ideas");
    }
}
