use std::sync::mpsc;

use thiserror::Error;

use routeflow_core::StepError;
use routeflow_journal::JournalError;
use routeflow_route::RouteBuildError;

/// Caller-provided queue the runner forwards run-time errors into.
///
/// Sends never block on a consumer; an undrained sink is the integrator's
/// back-pressure risk to bound.
pub type ErrorSink = mpsc::Sender<RunError>;

/// Fatal configuration errors raised at build/wiring time or on an
/// unresolvable `exec` target. These abort initialization; they are never
/// run outcomes.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("route id '{0}' is already registered")]
    DuplicateRoute(String),

    #[error("route id '{0}' is reserved for the recovery route")]
    ReservedRouteId(String),

    #[error("endpoint of route '{route}' targets unregistered route '{target}'")]
    UnknownEndpointTarget { route: String, target: String },

    #[error("unknown route id '{0}'")]
    UnknownRoute(String),

    #[error("orchestrator is not initialized")]
    NotInitialized,

    #[error("orchestrator is already initialized")]
    AlreadyInitialized,

    #[error("default recovery route failed to build")]
    InvalidRecoveryRoute(#[source] RouteBuildError),

    #[error("failed to read the journal for route '{route}'")]
    Journal {
        route: String,
        #[source]
        source: JournalError,
    },

    #[error("journal shutdown failed")]
    Shutdown(#[source] JournalError),
}

/// Run-time errors forwarded to the [`ErrorSink`] for observability.
///
/// None of these stop a run: step errors trigger the rollback walk and
/// persistence errors are best-effort. The user-visible truth is the run's
/// terminal status.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("state '{state}' failed in route '{route}'")]
    Step {
        route: String,
        state: String,
        #[source]
        source: StepError,
    },

    #[error("failed to persist snapshot for route '{route}'")]
    Persist {
        route: String,
        #[source]
        source: JournalError,
    },

    #[error("failed to encode snapshot for route '{route}'")]
    Encode {
        route: String,
        #[source]
        source: serde_json::Error,
    },
}
