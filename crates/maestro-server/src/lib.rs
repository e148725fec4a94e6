//! # maestro-server
//!
//! Axum HTTP surface over the Maestro core: single-pattern orchestration,
//! design validation/execution, deployment CRUD + execute, the dynamic
//! `/api/deployed/*` dispatcher, instance lifecycle, and read-only browsing
//! of isolated temp workspaces. Execution event streams are exposed as
//! newline-delimited JSON bodies; richer framing belongs to the outer
//! REST/WS layer.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod stream;

pub use config::ServerConfig;
pub use server::{AppState, MaestroServer};
pub use shutdown::ShutdownCoordinator;
