//! # maestro-core
//!
//! Foundation types for the Maestro control plane.
//!
//! This crate provides the shared vocabulary that all other Maestro crates
//! depend on:
//!
//! - **Branded IDs**: `ExecutionId`, `BlockId`, `DeploymentId`, ... as
//!   newtypes for type safety
//! - **Design model**: `Design`, `Block`, `Agent`, `Connection` with
//!   acceptance-time validation (cycles, duplicate names, empty blocks)
//! - **Execution events**: the `ExecutionEvent` vocabulary emitted by the
//!   orchestration engine and consumed by stream subscribers
//! - **Errors**: `MaestroError` hierarchy via `thiserror`, with the boundary
//!   error kinds (`DesignCyclic`, `AgentFailed`, `RoutingUndecided`, ...)
//! - **Text utilities**: UTF-8–safe truncation for log previews

#![deny(unsafe_code)]

pub mod design;
pub mod errors;
pub mod events;
pub mod ids;
pub mod text;

pub use design::{Agent, AgentRole, Block, BlockKind, Connection, Design, ToolPreference};
pub use errors::MaestroError;
pub use events::ExecutionEvent;
pub use ids::{BlockId, DeploymentId, DesignId, ExecutionId, InstanceId, UserId, WorkflowId};
