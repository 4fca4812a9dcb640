use thiserror::Error;

/// Type-erased failure returned by a step action.
///
/// The graph is heterogeneous, so step errors are boxed rather than carried
/// as a generic parameter; the engine wraps them with route and state names
/// before forwarding them to the error sink.
pub type StepError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("context gid must not be empty")]
    EmptyGid,

    #[error("constant '{0}' is already set")]
    ConstantAlreadySet(String),
}

/// Why a persisted snapshot was rejected during restore.
///
/// Restore rejection is never a hard failure for callers: the engine degrades
/// every variant to "no snapshot" and starts cold.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("snapshot is not well-formed")]
    Decode(#[source] serde_json::Error),

    #[error("snapshot route id is empty")]
    EmptyRouteId,

    #[error("snapshot step {0} is negative")]
    NegativeStep(i64),
}
