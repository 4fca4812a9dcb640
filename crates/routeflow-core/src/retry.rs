use std::time::Duration;

/// Outcome of consulting a [`RetryPolicy`] about a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-execute the step after the given delay.
    Retry(Duration),
    /// Let the failure stand and start compensation.
    GiveUp,
}

/// Pluggable retry policy, consulted by the walking engine before a failed
/// step transitions the run into rollback.
///
/// No policy is installed by default: every error gives up immediately.
pub trait RetryPolicy: Send + Sync {
    fn decide(
        &self,
        attempt: u32,
        error: &(dyn std::error::Error + Send + Sync),
    ) -> RetryDecision;
}
