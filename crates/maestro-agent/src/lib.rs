//! # maestro-agent
//!
//! One agent turn: build the system prompt, pick a tool policy, invoke the
//! external assistant CLI as a subprocess, stream its structured events, and
//! return an aggregated [`TurnResult`].
//!
//! The CLI has two output modes, unified behind one [`CliEvent`] vocabulary:
//!
//! - **JSON mode** (API-key requests): one JSON event per stdout line with a
//!   `type` field (`text`, `tool_use`, `tool_result`, `usage`, `error`);
//! - **plain mode** (profile requests): ANSI-decorated text with well-known
//!   tool-use sentinels (`💻 Running command ...`, `📖 Reading ...`,
//!   `✏️ Edited ...`).
//!
//! The parser is a line-aware state machine, not string matching sprinkled
//! through call sites.

#![deny(unsafe_code)]

pub mod events;
pub mod mcp;
pub mod parser;
pub mod prompt;
pub mod runner;
pub mod turn;

pub use events::CliEvent;
pub use parser::EventParser;
pub use prompt::{WorkspaceInstruction, build_system_prompt, resolve_tool_policy};
pub use runner::CliAgentRunner;
pub use turn::{TurnRequest, TurnResult};
