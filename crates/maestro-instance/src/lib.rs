//! # maestro-instance
//!
//! Long-lived interactive CLI sessions attached to pseudo-terminals.
//!
//! One instance = one subprocess on a PTY plus one reader pipeline. The
//! pipeline runs every PTY read through the line-aware event parser shared
//! with the turn runner, persists each observed event to `instance_logs`,
//! applies metric deltas to the instance row (so the aggregate always equals
//! the sum over the log), and fans events out to subscribers over a bounded
//! drop-oldest channel.
//!
//! State machine: `starting → ready ↔ running → stopped | failed`, with
//! `running → interrupted → ready` for interrupts that quiesce in time.

#![deny(unsafe_code)]

pub mod manager;
pub mod output;
pub mod pty;

pub use manager::{InstanceManager, InstanceManagerConfig};
pub use output::InstanceEvent;
