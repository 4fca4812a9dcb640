//! Orchestration of routeflow workflows.
//!
//! The [`Orchestrator`] is a registry of independently built routes: it
//! merges their graphs into one arena, wires cross-route hand-offs recorded
//! as endpoints, installs a recovery route under the reserved id, and is the
//! execution entry point. Each `exec` drives a fresh route runner that
//! snapshots after every step, forwards step errors to the caller's sink,
//! and transiently diverts into the recovery route on failure.

mod cancel;
mod error;
mod orchestrator;
mod runner;

pub use cancel::CancelToken;
pub use error::{ErrorSink, OrchestratorError, RunError};
pub use orchestrator::{Orchestrator, RECOVERY_ROUTE_ID};
