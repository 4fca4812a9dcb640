use std::cmp::Reverse;
use std::sync::Arc;
use std::thread;

use crate::context::{Context, ContextSnapshot};
use crate::error::StepError;
use crate::graph::{RouteGraph, StateId, Transition};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::status::MachineStatus;

/// The single walking algorithm.
///
/// Drives both forward execution and compensation: rollback is not a separate
/// code path, just ordinary traversal guided by edges whose guards key off
/// the reserved machine-status entry in the [`Context`]. The machine itself
/// only tracks the current state id; all walk state that must survive
/// snapshotting lives in the context.
pub struct StateMachine<'g> {
    graph: &'g RouteGraph,
    current: StateId,
    retry: Option<Arc<dyn RetryPolicy>>,
}

impl<'g> StateMachine<'g> {
    #[must_use]
    pub fn new(graph: &'g RouteGraph, start: StateId) -> Self {
        Self {
            graph,
            current: start,
            retry: None,
        }
    }

    /// Install a retry policy, consulted before the walk commits to rollback.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Bind the current pointer and context. Sets the status to `InProgress`
    /// only when the context carries none, so re-initializing onto a saved
    /// memento resumes mid-walk rather than restarting.
    pub fn init(&mut self, state: StateId, ctx: &Context) {
        self.current = state;
        if ctx.machine_status().is_none() {
            ctx.set_machine_status(MachineStatus::InProgress);
        }
    }

    #[must_use]
    pub fn current(&self) -> StateId {
        self.current
    }

    #[must_use]
    pub fn has_next(&self, ctx: &Context) -> bool {
        ctx.machine_status() != Some(MachineStatus::Closed)
    }

    /// Execute the current state's action, then select and take a transition.
    ///
    /// A failed action flips the status to `Rollback` (unless already
    /// terminal) but does not stop the walk: the same call still evaluates
    /// transitions. Candidates are tried in descending priority; ties keep
    /// insertion order, which is load-bearing because the happy-path edge and
    /// the rollback-gated edge out of one state are often equal-priority with
    /// a specific intended try-order. When no guard passes the status becomes
    /// `Closed`.
    ///
    /// # Errors
    ///
    /// Returns the step's error (after the move) so the caller can forward it
    /// and interpose recovery.
    pub fn next(&mut self, ctx: &Context) -> Result<(), StepError> {
        let graph = self.graph;
        let state = graph.state(self.current);

        let mut result = (state.action)(ctx);
        if result.is_err() {
            if let Some(policy) = &self.retry {
                let mut attempt: u32 = 1;
                while let Err(err) = &result {
                    match policy.decide(attempt, err.as_ref()) {
                        RetryDecision::Retry(delay) => {
                            thread::sleep(delay);
                            attempt += 1;
                            result = (state.action)(ctx);
                        }
                        RetryDecision::GiveUp => break,
                    }
                }
            }
        }

        if result.is_err() && ctx.machine_status() != Some(MachineStatus::Closed) {
            ctx.set_machine_status(MachineStatus::Rollback);
        }

        // Scratch list so the graph itself is never mutated by execution.
        let mut candidates: Vec<&Transition> = state.transitions().iter().collect();
        candidates.sort_by_key(|transition| Reverse(transition.priority()));

        for transition in candidates {
            if transition.should_take(ctx) {
                self.current = transition.to();
                return result;
            }
        }

        ctx.set_machine_status(MachineStatus::Closed);
        result
    }

    /// Capture (current state, deep context copy) for snapshotting and for
    /// resuming exactly where a recovery diversion left off.
    #[must_use]
    pub fn memento(&self, ctx: &Context) -> (StateId, ContextSnapshot) {
        (self.current, ctx.snapshot())
    }
}
