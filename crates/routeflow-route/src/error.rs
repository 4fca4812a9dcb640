use thiserror::Error;

/// Construction defects, surfaced by `build()`.
///
/// The builders are fluent, so defects are deferred: the first one sticks and
/// every later call becomes a no-op. All of these are fatal configuration
/// errors and abort initialization.
#[derive(Debug, Error)]
pub enum RouteBuildError {
    #[error("route '{route}' has no steps")]
    EmptyRoute { route: String },

    #[error("'when' before the first step in route '{route}'")]
    WhenBeforeFirstStep { route: String },

    #[error("'otherwise' without a matching 'when' in route '{route}'")]
    UnmatchedOtherwise { route: String },

    #[error("a second 'otherwise' for the same 'when' in route '{route}'")]
    DuplicateOtherwise { route: String },

    #[error("'end' without a matching 'when' in route '{route}'")]
    UnmatchedEnd { route: String },

    #[error("endpoint to '{target}' recorded before the first step in route '{route}'")]
    EndpointBeforeFirstStep { route: String, target: String },
}
