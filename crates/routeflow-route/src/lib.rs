//! Fluent construction of workflow graphs.
//!
//! A route is built step by step: linear steps chain two-way transitions
//! (forward plus compensating reverse), `when`/`otherwise`/`end` open and
//! close conditional branches, and `to` records a hand-off endpoint for the
//! orchestrator to wire. [`TransactionalRoute`] steps carry an undo action
//! and are walked back on failure; [`NonTransactionalRoute`] steps are
//! forward-only.

mod built;
mod error;
mod non_transactional;
mod stack;
mod step;
mod transactional;

pub use built::{BuiltRoute, Endpoint};
pub use error::RouteBuildError;
pub use non_transactional::NonTransactionalRoute;
pub use step::SagaStep;
pub use transactional::{PendingStep, TransactionalRoute};
