use routeflow_core::{Context, StepError};

/// A step in a transactional route: a forward action plus the compensation
/// that undoes it.
///
/// The builder wraps both into a single state action that dispatches on the
/// reserved machine-status entry: `compensate` runs while the walk is rolling
/// back, `execute` otherwise.
pub trait SagaStep: Send + Sync {
    /// Short name, combined with the route id into the state's diagnostic
    /// name.
    fn name(&self) -> &str;

    /// Execute the step's forward action.
    ///
    /// # Errors
    ///
    /// Returns an error if the step fails; the walk then flips to rollback
    /// and retraces the compensating edges.
    fn execute(&self, ctx: &Context) -> Result<(), StepError>;

    /// Compensate (undo) the step's effects.
    ///
    /// The default implementation is a no-op, suitable for read-only steps.
    fn compensate(&self, ctx: &Context) {
        let _ = ctx;
    }
}
