//! Design data model and acceptance-time validation.
//!
//! A [`Design`] is a DAG of [`Block`]s joined by [`Connection`]s. Each block
//! runs one orchestration pattern over its agents. Validation runs at design
//! acceptance (write time) and again at execute time, so a cyclic or
//! malformed design is rejected before any agent turn starts.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::MaestroError;
use crate::ids::BlockId;

/// Role an agent plays within its block's pattern.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Delegates work and synthesizes results (hierarchical).
    Manager,
    /// Executes assigned work.
    #[default]
    Worker,
    /// Candidate for dynamic routing.
    Specialist,
    /// Summarizes a debate transcript.
    Moderator,
    /// Analyzes a design and suggests prompt edits.
    Reflector,
}

/// Whether an agent's turns run with tools enabled.
///
/// `Auto` defers to a keyword scan of the system prompt at turn time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ToolPreference {
    /// Decide from the system prompt at turn time.
    #[default]
    Auto,
    /// Always enable tools.
    Enabled,
    /// Never enable tools.
    Disabled,
}

impl Serialize for ToolPreference {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Auto => serializer.serialize_str("auto"),
            Self::Enabled => serializer.serialize_bool(true),
            Self::Disabled => serializer.serialize_bool(false),
        }
    }
}

impl<'de> Deserialize<'de> for ToolPreference {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Accepts `true`, `false`, or the string "auto".
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Ok(Self::Enabled),
            Raw::Flag(false) => Ok(Self::Disabled),
            Raw::Text(s) if s.eq_ignore_ascii_case("auto") => Ok(Self::Auto),
            Raw::Text(s) => Err(serde::de::Error::custom(format!(
                "expected true, false, or \"auto\", got \"{s}\""
            ))),
        }
    }
}

/// Identity and contract for one CLI turn.
///
/// Value object: created by the caller, never mutated by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Opaque identifier.
    #[serde(default)]
    pub id: String,
    /// Unique within the enclosing block.
    pub name: String,
    /// System prompt for the agent's turns.
    pub system_prompt: String,
    /// Pattern role.
    #[serde(default)]
    pub role: AgentRole,
    /// Tool availability preference.
    #[serde(default)]
    pub use_tools: ToolPreference,
    /// Optional model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Agent {
    /// Construct a worker agent with the given name and prompt.
    #[must_use]
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            system_prompt: system_prompt.into(),
            role: AgentRole::default(),
            use_tools: ToolPreference::default(),
            model: None,
        }
    }

    /// Set the pattern role.
    #[must_use]
    pub fn with_role(mut self, role: AgentRole) -> Self {
        self.role = role;
        self
    }

    /// Set the tool preference.
    #[must_use]
    pub fn with_tools(mut self, use_tools: ToolPreference) -> Self {
        self.use_tools = use_tools;
        self
    }
}

/// Orchestration pattern a block runs over its agents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Chain agents, each consuming the previous agent's output.
    Sequential,
    /// Run agents concurrently, optionally aggregating.
    Parallel,
    /// Manager delegates, workers execute, manager synthesizes.
    Hierarchical,
    /// Debaters alternate for a number of rounds.
    Debate,
    /// A router selects specialists to run.
    Routing,
    /// Analyze the enclosing design and suggest prompt edits.
    Reflection,
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Hierarchical => "hierarchical",
            Self::Debate => "debate",
            Self::Routing => "routing",
            Self::Reflection => "reflection",
        };
        f.write_str(s)
    }
}

/// One node in a composite design.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Unique within the design.
    pub id: BlockId,
    /// Pattern to run.
    #[serde(rename = "type")]
    pub kind: BlockKind,
    /// Agents, in pattern order.
    pub agents: Vec<Agent>,
    /// The block task text.
    pub task: String,
    /// Give each agent its own git clone under the execution's temp parent.
    #[serde(default)]
    pub isolate_agent_workspaces: bool,
    /// Repository to clone for the block's workspace(s).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<String>,
    /// Branch to check out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Rounds for debate / hierarchical repetition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rounds: Option<u32>,
    /// Name of the aggregator agent (parallel).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregator: Option<String>,
    /// Name of the manager agent (hierarchical).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
}

impl Block {
    /// Construct a block with the given id, kind, and task.
    #[must_use]
    pub fn new(id: impl Into<BlockId>, kind: BlockKind, task: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            agents: Vec::new(),
            task: task.into(),
            isolate_agent_workspaces: false,
            git_repo: None,
            branch: None,
            rounds: None,
            aggregator: None,
            manager: None,
        }
    }

    /// Append an agent.
    #[must_use]
    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    /// Look up an agent by name.
    #[must_use]
    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.name == name)
    }
}

/// Directed edge between blocks, optionally agent-scoped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Upstream block.
    pub source_block: BlockId,
    /// Downstream block.
    pub target_block: BlockId,
    /// Scope the edge to one source agent's turn result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_agent: Option<String>,
    /// Deliver only to this agent of the target block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agent: Option<String>,
}

impl Connection {
    /// Whether this edge carries agent-level routing.
    #[must_use]
    pub fn is_agent_scoped(&self) -> bool {
        self.source_agent.is_some() || self.target_agent.is_some()
    }
}

/// A composite design: blocks plus data edges.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Design {
    /// Nodes, in definition order.
    pub blocks: Vec<Block>,
    /// Directed edges.
    #[serde(default)]
    pub connections: Vec<Connection>,
}

/// Replace whitespace with `_` and strip path-unsafe characters from an agent
/// name, producing the isolated-workspace subdirectory name.
#[must_use]
pub fn sanitize_agent_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect()
}

impl Design {
    /// A design with a single block and no connections.
    #[must_use]
    pub fn single(block: Block) -> Self {
        Self {
            blocks: vec![block],
            connections: Vec::new(),
        }
    }

    /// Look up a block by id.
    #[must_use]
    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    /// Validate the design for acceptance.
    ///
    /// Checks block-level pattern constraints, name uniqueness, connection
    /// referential integrity, and acyclicity.
    pub fn validate(&self) -> Result<(), MaestroError> {
        if self.blocks.is_empty() {
            return Err(MaestroError::Validation("design has no blocks".into()));
        }

        let mut seen_blocks = HashSet::new();
        for block in &self.blocks {
            if !seen_blocks.insert(block.id.clone()) {
                return Err(MaestroError::Validation(format!(
                    "duplicate block id {}",
                    block.id
                )));
            }
            validate_block(block)?;
        }

        for conn in &self.connections {
            let source = self.block(&conn.source_block).ok_or_else(|| {
                MaestroError::Validation(format!(
                    "connection references unknown source block {}",
                    conn.source_block
                ))
            })?;
            let target = self.block(&conn.target_block).ok_or_else(|| {
                MaestroError::Validation(format!(
                    "connection references unknown target block {}",
                    conn.target_block
                ))
            })?;
            if let Some(name) = &conn.source_agent {
                if source.agent(name).is_none() {
                    return Err(MaestroError::Validation(format!(
                        "connection references unknown agent {name} in block {}",
                        source.id
                    )));
                }
            }
            if let Some(name) = &conn.target_agent {
                if target.agent(name).is_none() {
                    return Err(MaestroError::Validation(format!(
                        "connection references unknown agent {name} in block {}",
                        target.id
                    )));
                }
            }
        }

        let _ = self.topological_order()?;
        Ok(())
    }

    /// Compute a stable topological order over the block graph.
    ///
    /// Kahn's algorithm; the ready set is consumed in definition order, so
    /// the result is deterministic for a given design. Agent-scoped edges are
    /// overlays on the same block DAG and do not add ordering beyond their
    /// block pair.
    pub fn topological_order(&self) -> Result<Vec<BlockId>, MaestroError> {
        let index: HashMap<&BlockId, usize> = self
            .blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (&b.id, i))
            .collect();

        // Dedup edges so parallel block-level + agent-level overlays count once.
        let mut edges: HashSet<(usize, usize)> = HashSet::new();
        for conn in &self.connections {
            let (Some(&s), Some(&t)) = (
                index.get(&conn.source_block),
                index.get(&conn.target_block),
            ) else {
                continue;
            };
            let _ = edges.insert((s, t));
        }

        let mut in_degree = vec![0_usize; self.blocks.len()];
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); self.blocks.len()];
        for &(s, t) in &edges {
            in_degree[t] += 1;
            adjacency[s].push(t);
        }

        let mut order = Vec::with_capacity(self.blocks.len());
        let mut ready: Vec<usize> = (0..self.blocks.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();

        while let Some(&next) = ready.iter().min() {
            ready.retain(|&i| i != next);
            order.push(self.blocks[next].id.clone());
            for &t in &adjacency[next] {
                in_degree[t] -= 1;
                if in_degree[t] == 0 {
                    ready.push(t);
                }
            }
        }

        if order.len() != self.blocks.len() {
            let stuck = (0..self.blocks.len())
                .find(|&i| in_degree[i] > 0)
                .map_or_else(String::new, |i| self.blocks[i].id.to_string());
            return Err(MaestroError::DesignCyclic { block_id: stuck });
        }
        Ok(order)
    }

    /// Block-level predecessors of `target`, in predecessor id order.
    #[must_use]
    pub fn block_predecessors(&self, target: &BlockId) -> Vec<BlockId> {
        let mut preds: Vec<BlockId> = self
            .connections
            .iter()
            .filter(|c| &c.target_block == target && !c.is_agent_scoped())
            .map(|c| c.source_block.clone())
            .collect();
        preds.sort();
        preds.dedup();
        preds
    }

    /// Agent-scoped inbound edges of `target`, in source block id order.
    #[must_use]
    pub fn agent_bindings(&self, target: &BlockId) -> Vec<&Connection> {
        let mut bindings: Vec<&Connection> = self
            .connections
            .iter()
            .filter(|c| &c.target_block == target && c.is_agent_scoped())
            .collect();
        bindings.sort_by(|a, b| a.source_block.cmp(&b.source_block));
        bindings
    }
}

fn validate_block(block: &Block) -> Result<(), MaestroError> {
    if block.agents.is_empty() {
        return Err(MaestroError::Validation(format!(
            "block {} has no agents",
            block.id
        )));
    }

    let mut names = HashSet::new();
    let mut sanitized: BTreeMap<String, String> = BTreeMap::new();
    for agent in &block.agents {
        if agent.name.trim().is_empty() {
            return Err(MaestroError::Validation(format!(
                "block {} has an agent with an empty name",
                block.id
            )));
        }
        if !names.insert(agent.name.clone()) {
            return Err(MaestroError::Validation(format!(
                "duplicate agent name {} in block {}",
                agent.name, block.id
            )));
        }
        let clean = sanitize_agent_name(&agent.name);
        if let Some(other) = sanitized.insert(clean.clone(), agent.name.clone()) {
            return Err(MaestroError::Validation(format!(
                "agents {other} and {} in block {} collide after sanitization ({clean})",
                agent.name, block.id
            )));
        }
    }

    match block.kind {
        BlockKind::Sequential => {}
        BlockKind::Parallel => {
            let workers = block
                .agents
                .iter()
                .filter(|a| Some(&a.name) != block.aggregator.as_ref())
                .count();
            if workers == 0 {
                return Err(MaestroError::Validation(format!(
                    "parallel block {} has no worker agents",
                    block.id
                )));
            }
            if let Some(name) = &block.aggregator {
                if block.agent(name).is_none() {
                    return Err(MaestroError::Validation(format!(
                        "parallel block {} names unknown aggregator {name}",
                        block.id
                    )));
                }
            }
        }
        BlockKind::Hierarchical => {
            let manager = block
                .manager
                .clone()
                .or_else(|| {
                    block
                        .agents
                        .iter()
                        .find(|a| a.role == AgentRole::Manager)
                        .map(|a| a.name.clone())
                })
                .ok_or_else(|| {
                    MaestroError::Validation(format!(
                        "hierarchical block {} has no manager agent",
                        block.id
                    ))
                })?;
            if block.agent(&manager).is_none() {
                return Err(MaestroError::Validation(format!(
                    "hierarchical block {} names unknown manager {manager}",
                    block.id
                )));
            }
            if block.agents.len() < 2 {
                return Err(MaestroError::Validation(format!(
                    "hierarchical block {} needs at least one worker besides the manager",
                    block.id
                )));
            }
        }
        BlockKind::Debate => {
            if block.rounds.unwrap_or(0) == 0 {
                return Err(MaestroError::Validation(format!(
                    "debate block {} needs rounds >= 1",
                    block.id
                )));
            }
            let debaters = block
                .agents
                .iter()
                .filter(|a| a.role != AgentRole::Moderator)
                .count();
            if debaters < 2 {
                return Err(MaestroError::Validation(format!(
                    "debate block {} needs at least two debaters",
                    block.id
                )));
            }
        }
        BlockKind::Routing => {
            let specialists = block
                .agents
                .iter()
                .filter(|a| a.role == AgentRole::Specialist)
                .count();
            if specialists == 0 {
                return Err(MaestroError::Validation(format!(
                    "routing block {} has no specialist agents",
                    block.id
                )));
            }
            if block.agents.len() == specialists {
                return Err(MaestroError::Validation(format!(
                    "routing block {} has no router agent",
                    block.id
                )));
            }
        }
        BlockKind::Reflection => {
            if block.agents.len() != 1 {
                return Err(MaestroError::Validation(format!(
                    "reflection block {} needs exactly one reflector agent",
                    block.id
                )));
            }
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn seq_block(id: &str) -> Block {
        Block::new(id, BlockKind::Sequential, "task").with_agent(Agent::new("A", "do the thing"))
    }

    #[test]
    fn tool_preference_serde_forms() {
        assert_eq!(
            serde_json::to_string(&ToolPreference::Auto).unwrap(),
            "\"auto\""
        );
        assert_eq!(serde_json::to_string(&ToolPreference::Enabled).unwrap(), "true");
        let auto: ToolPreference = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(auto, ToolPreference::Auto);
        let on: ToolPreference = serde_json::from_str("true").unwrap();
        assert_eq!(on, ToolPreference::Enabled);
        let off: ToolPreference = serde_json::from_str("false").unwrap();
        assert_eq!(off, ToolPreference::Disabled);
        assert!(serde_json::from_str::<ToolPreference>("\"maybe\"").is_err());
    }

    #[test]
    fn sanitize_replaces_whitespace_and_strips_unsafe() {
        assert_eq!(sanitize_agent_name("Code Reviewer"), "Code_Reviewer");
        assert_eq!(sanitize_agent_name("a/b\\c"), "abc");
        assert_eq!(sanitize_agent_name("dots.are-ok_1"), "dots.are-ok_1");
    }

    #[test]
    fn empty_design_rejected() {
        let design = Design::default();
        assert_matches!(design.validate(), Err(MaestroError::Validation(_)));
    }

    #[test]
    fn zero_agent_block_rejected() {
        let design = Design::single(Block::new("b1", BlockKind::Sequential, "t"));
        assert_matches!(design.validate(), Err(MaestroError::Validation(_)));
    }

    #[test]
    fn duplicate_agent_names_rejected() {
        let block = Block::new("b1", BlockKind::Sequential, "t")
            .with_agent(Agent::new("A", "p"))
            .with_agent(Agent::new("A", "p"));
        assert_matches!(
            Design::single(block).validate(),
            Err(MaestroError::Validation(_))
        );
    }

    #[test]
    fn sanitized_collision_rejected() {
        let block = Block::new("b1", BlockKind::Sequential, "t")
            .with_agent(Agent::new("my agent", "p"))
            .with_agent(Agent::new("my_agent", "p"));
        let err = Design::single(block).validate().unwrap_err();
        assert!(err.to_string().contains("collide"));
    }

    #[test]
    fn debate_zero_rounds_rejected() {
        let mut block = Block::new("b1", BlockKind::Debate, "t")
            .with_agent(Agent::new("Pro", "argue for"))
            .with_agent(Agent::new("Con", "argue against"));
        block.rounds = Some(0);
        assert_matches!(
            Design::single(block).validate(),
            Err(MaestroError::Validation(_))
        );
    }

    #[test]
    fn debate_one_debater_rejected() {
        let mut block =
            Block::new("b1", BlockKind::Debate, "t").with_agent(Agent::new("Solo", "argue"));
        block.rounds = Some(2);
        assert_matches!(
            Design::single(block).validate(),
            Err(MaestroError::Validation(_))
        );
    }

    #[test]
    fn routing_without_specialists_rejected() {
        let block =
            Block::new("b1", BlockKind::Routing, "t").with_agent(Agent::new("Router", "route"));
        assert_matches!(
            Design::single(block).validate(),
            Err(MaestroError::Validation(_))
        );
    }

    #[test]
    fn hierarchical_without_manager_rejected() {
        let block = Block::new("b1", BlockKind::Hierarchical, "t")
            .with_agent(Agent::new("W1", "work"))
            .with_agent(Agent::new("W2", "work"));
        assert_matches!(
            Design::single(block).validate(),
            Err(MaestroError::Validation(_))
        );
    }

    #[test]
    fn hierarchical_with_manager_role_accepted() {
        let block = Block::new("b1", BlockKind::Hierarchical, "t")
            .with_agent(Agent::new("Boss", "delegate").with_role(AgentRole::Manager))
            .with_agent(Agent::new("W1", "work"));
        Design::single(block).validate().unwrap();
    }

    #[test]
    fn unknown_connection_block_rejected() {
        let mut design = Design::single(seq_block("b1"));
        design.connections.push(Connection {
            source_block: "b1".into(),
            target_block: "ghost".into(),
            source_agent: None,
            target_agent: None,
        });
        assert_matches!(design.validate(), Err(MaestroError::Validation(_)));
    }

    #[test]
    fn unknown_connection_agent_rejected() {
        let mut design = Design {
            blocks: vec![seq_block("b1"), seq_block("b2")],
            connections: Vec::new(),
        };
        design.connections.push(Connection {
            source_block: "b1".into(),
            target_block: "b2".into(),
            source_agent: Some("Nobody".into()),
            target_agent: None,
        });
        assert_matches!(design.validate(), Err(MaestroError::Validation(_)));
    }

    #[test]
    fn cycle_rejected() {
        let design = Design {
            blocks: vec![seq_block("b1"), seq_block("b2")],
            connections: vec![
                Connection {
                    source_block: "b1".into(),
                    target_block: "b2".into(),
                    source_agent: None,
                    target_agent: None,
                },
                Connection {
                    source_block: "b2".into(),
                    target_block: "b1".into(),
                    source_agent: None,
                    target_agent: None,
                },
            ],
        };
        assert_matches!(design.validate(), Err(MaestroError::DesignCyclic { .. }));
    }

    #[test]
    fn self_loop_rejected() {
        let mut design = Design::single(seq_block("b1"));
        design.connections.push(Connection {
            source_block: "b1".into(),
            target_block: "b1".into(),
            source_agent: None,
            target_agent: None,
        });
        assert_matches!(
            design.topological_order(),
            Err(MaestroError::DesignCyclic { .. })
        );
    }

    #[test]
    fn topological_order_is_valid_and_stable() {
        // Diamond: b1 -> {b2, b3} -> b4
        let design = Design {
            blocks: vec![
                seq_block("b1"),
                seq_block("b2"),
                seq_block("b3"),
                seq_block("b4"),
            ],
            connections: vec![
                Connection {
                    source_block: "b1".into(),
                    target_block: "b2".into(),
                    source_agent: None,
                    target_agent: None,
                },
                Connection {
                    source_block: "b1".into(),
                    target_block: "b3".into(),
                    source_agent: None,
                    target_agent: None,
                },
                Connection {
                    source_block: "b2".into(),
                    target_block: "b4".into(),
                    source_agent: None,
                    target_agent: None,
                },
                Connection {
                    source_block: "b3".into(),
                    target_block: "b4".into(),
                    source_agent: None,
                    target_agent: None,
                },
            ],
        };
        let order = design.topological_order().unwrap();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0].as_str(), "b1");
        assert_eq!(order[3].as_str(), "b4");
        // Definition order breaks ties.
        assert_eq!(order[1].as_str(), "b2");
        assert_eq!(order[2].as_str(), "b3");
        // Deterministic across calls.
        assert_eq!(order, design.topological_order().unwrap());
    }

    #[test]
    fn agent_level_edge_between_same_blocks_as_block_level_counts_once() {
        let b1 = Block::new("b1", BlockKind::Sequential, "t").with_agent(Agent::new("X", "p"));
        let b2 = Block::new("b2", BlockKind::Sequential, "t").with_agent(Agent::new("Y", "p"));
        let design = Design {
            blocks: vec![b1, b2],
            connections: vec![
                Connection {
                    source_block: "b1".into(),
                    target_block: "b2".into(),
                    source_agent: None,
                    target_agent: None,
                },
                Connection {
                    source_block: "b1".into(),
                    target_block: "b2".into(),
                    source_agent: Some("X".into()),
                    target_agent: Some("Y".into()),
                },
            ],
        };
        design.validate().unwrap();
        assert_eq!(design.block_predecessors(&"b2".into()), vec![BlockId::from("b1")]);
        assert_eq!(design.agent_bindings(&"b2".into()).len(), 1);
    }

    #[test]
    fn design_json_roundtrip() {
        let block = Block::new("b1", BlockKind::Parallel, "List a number.")
            .with_agent(Agent::new("A", "reply 1"))
            .with_agent(Agent::new("B", "reply 2"));
        let design = Design::single(block);
        let json = serde_json::to_string(&design).unwrap();
        let back: Design = serde_json::from_str(&json).unwrap();
        assert_eq!(design, back);
        // Block kind serializes under the `type` key.
        assert!(json.contains("\"type\":\"parallel\""));
    }
}
