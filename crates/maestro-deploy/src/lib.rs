//! # maestro-deploy
//!
//! Persisted deployments made executable three ways: manual call, cron or
//! interval schedule (timezone-aware), and POST to a user-defined path.
//! Every run is captured as an execution log; the scheduler holds at most
//! one registration per deployment and is started exactly once at service
//! start and shut down exactly once at service stop.

#![deny(unsafe_code)]

pub mod dispatcher;
pub mod schedule;
pub mod scheduler;
pub mod service;

pub use dispatcher::{DispatchError, Dispatcher, ExecutionOutcome};
pub use schedule::{IntervalUnit, Schedule};
pub use scheduler::Scheduler;
pub use service::{DeploymentService, validate_endpoint_path};
