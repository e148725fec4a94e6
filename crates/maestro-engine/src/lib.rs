//! # maestro-engine
//!
//! Orchestration pattern executors and the design DAG executor.
//!
//! Five patterns (sequential, parallel, hierarchical, debate, routing) plus
//! reflection are implemented over one [`TurnExecutor`] seam, so tests swap
//! the assistant CLI for scripted turns. The DAG executor topologically
//! orders a design's blocks, carries data over block-level and agent-level
//! edges, provisions (and always cleans up) workspaces, and emits
//! [`maestro_core::ExecutionEvent`]s on a per-execution channel.

#![deny(unsafe_code)]

pub mod context;
pub mod dag;
pub mod emitter;
pub mod executor;
pub mod patterns;

#[cfg(test)]
pub(crate) mod testutil;

pub use context::{BlockContext, BlockInput, BlockOutput, WorkspaceBinding};
pub use dag::{DesignExecutor, ExecuteOptions, ExecutionSummary};
pub use emitter::EventEmitter;
pub use executor::{CliTurnExecutor, TurnExecutor};
