//! Tool policy and system prompt construction.
//!
//! The shared-workspace and isolated-workspace instruction forms are
//! enumerated variants of [`WorkspaceInstruction`]; a turn carries at most
//! one, so the two forms cannot both be emitted for the same turn.

use maestro_core::design::{Agent, ToolPreference};

/// Keywords whose presence in a system prompt implies tool intent.
const TOOL_INTENT_KEYWORDS: &[&str] = &[
    "file", "read", "write", "bash", "execute", "edit", "mcp",
];

/// Workspace instruction prepended to tool-enabled turns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkspaceInstruction {
    /// Shared workspace: editor tool calls carry the workflow id only.
    Shared {
        /// Owning workflow.
        workflow_id: String,
    },
    /// Isolated workspace: editor tool calls carry the workflow id and the
    /// agent's absolute workspace path.
    Isolated {
        /// Owning workflow.
        workflow_id: String,
        /// The agent's isolated clone path.
        workspace_path: String,
    },
}

impl WorkspaceInstruction {
    fn render(&self) -> String {
        match self {
            Self::Shared { workflow_id } => format!(
                "When calling editor tools, always pass workflow_id=\"{workflow_id}\" \
                 so your edits land in the workflow's workspace."
            ),
            Self::Isolated {
                workflow_id,
                workspace_path,
            } => format!(
                "When calling editor tools, always pass workflow_id=\"{workflow_id}\" \
                 and workspace_path=\"{workspace_path}\" on every call. Your workspace \
                 is isolated; edits outside it will be rejected."
            ),
        }
    }
}

/// Resolve whether a turn runs with tools enabled.
///
/// An explicit preference is honored; `Auto` scans the system prompt for
/// tool-intent keywords.
#[must_use]
pub fn resolve_tool_policy(agent: &Agent) -> bool {
    match agent.use_tools {
        ToolPreference::Enabled => true,
        ToolPreference::Disabled => false,
        ToolPreference::Auto => {
            let prompt = agent.system_prompt.to_lowercase();
            TOOL_INTENT_KEYWORDS.iter().any(|kw| prompt.contains(kw))
        }
    }
}

/// Build the final system prompt for a turn.
///
/// When tools are enabled and a workspace instruction is present, the
/// instruction is prepended; otherwise the agent's prompt is used as-is.
#[must_use]
pub fn build_system_prompt(
    agent: &Agent,
    tools_enabled: bool,
    instruction: Option<&WorkspaceInstruction>,
) -> String {
    match (tools_enabled, instruction) {
        (true, Some(instruction)) => {
            format!("{}\n\n{}", instruction.render(), agent.system_prompt)
        }
        _ => agent.system_prompt.clone(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(prompt: &str, pref: ToolPreference) -> Agent {
        Agent::new("A", prompt).with_tools(pref)
    }

    #[test]
    fn explicit_preference_wins() {
        assert!(resolve_tool_policy(&agent("just talk", ToolPreference::Enabled)));
        assert!(!resolve_tool_policy(&agent(
            "edit the file with bash",
            ToolPreference::Disabled
        )));
    }

    #[test]
    fn auto_scans_for_keywords() {
        assert!(resolve_tool_policy(&agent(
            "Read the config and edit it",
            ToolPreference::Auto
        )));
        assert!(resolve_tool_policy(&agent(
            "Execute the test suite",
            ToolPreference::Auto
        )));
        assert!(!resolve_tool_policy(&agent(
            "Translate the input to French",
            ToolPreference::Auto
        )));
    }

    #[test]
    fn auto_scan_is_case_insensitive() {
        assert!(resolve_tool_policy(&agent("USE BASH", ToolPreference::Auto)));
    }

    #[test]
    fn shared_instruction_has_workflow_only() {
        let agent = agent("edit files", ToolPreference::Enabled);
        let prompt = build_system_prompt(
            &agent,
            true,
            Some(&WorkspaceInstruction::Shared {
                workflow_id: "wf_1".into(),
            }),
        );
        assert!(prompt.contains("workflow_id=\"wf_1\""));
        assert!(!prompt.contains("workspace_path"));
        assert!(prompt.ends_with("edit files"));
    }

    #[test]
    fn isolated_instruction_has_both_ids() {
        let agent = agent("edit files", ToolPreference::Enabled);
        let prompt = build_system_prompt(
            &agent,
            true,
            Some(&WorkspaceInstruction::Isolated {
                workflow_id: "wf_1".into(),
                workspace_path: "/tmp/orchestration_isolated_e1/A".into(),
            }),
        );
        assert!(prompt.contains("workflow_id=\"wf_1\""));
        assert!(prompt.contains("workspace_path=\"/tmp/orchestration_isolated_e1/A\""));
    }

    #[test]
    fn instruction_forms_are_mutually_exclusive() {
        // One enum value renders exactly one form; the isolated render never
        // contains the shared-only phrasing and vice versa.
        let shared = WorkspaceInstruction::Shared {
            workflow_id: "wf".into(),
        };
        let isolated = WorkspaceInstruction::Isolated {
            workflow_id: "wf".into(),
            workspace_path: "/p".into(),
        };
        assert!(!shared.render().contains("workspace_path"));
        assert!(isolated.render().contains("workspace_path"));
    }

    #[test]
    fn tools_disabled_skips_instruction() {
        let agent = agent("no tools here", ToolPreference::Disabled);
        let prompt = build_system_prompt(
            &agent,
            false,
            Some(&WorkspaceInstruction::Shared {
                workflow_id: "wf_1".into(),
            }),
        );
        assert_eq!(prompt, "no tools here");
    }

    #[test]
    fn no_instruction_keeps_prompt_untouched() {
        let agent = agent("edit files", ToolPreference::Enabled);
        assert_eq!(build_system_prompt(&agent, true, None), "edit files");
    }
}
