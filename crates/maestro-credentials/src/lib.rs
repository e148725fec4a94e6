//! # maestro-credentials
//!
//! Per-request credential resolution for orchestration and instance spawns.
//!
//! On every request the provider re-reads the user's stored credentials
//! (nothing is cached across requests, so profile rotation takes effect
//! without a restart) and resolves one of:
//!
//! - **API key** — registered and marked active-default; returned in-memory,
//!   the CLI profile file on disk is never touched.
//! - **Profile** — the stored credential blob is written to the well-known
//!   CLI credentials file with mode `0600`.
//! - **Ambient** — neither is stored but the service environment carries a
//!   key the CLI will pick up on its own.
//!
//! Profile mode shares one file per OS user, so concurrent requests for
//! different users race on it. The provider owns a process-wide
//! `tokio::sync::Mutex`; callers hold the [`ProfileGuard`] across their
//! `write → spawn → wait` sequence. API-key requests never take the lock.

#![deny(unsafe_code)]

mod provider;

pub use provider::{AMBIENT_KEY_VAR, CredentialMode, CredentialProvider, ProfileGuard};
