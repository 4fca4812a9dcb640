use std::sync::Arc;

use tracing::{debug, warn};

use routeflow_core::{
    Context, ContextSnapshot, MachineStatus, RetryPolicy, RouteGraph, RunStatus, Snapshot,
    StateId, StateMachine,
};
use routeflow_journal::Caretaker;

use crate::cancel::CancelToken;
use crate::error::{ErrorSink, RunError};
use crate::orchestrator::RECOVERY_ROUTE_ID;

/// Drives one state machine to completion. Created fresh per execution and
/// discarded after.
///
/// The runner owns the concerns the machine does not: the linear step
/// counter (with its −1 rollback-underflow sentinel), per-step snapshot
/// persistence, error forwarding, and the one-level recovery diversion.
pub(crate) struct RouteRunner {
    route_id: String,
    root: StateId,
    recovery_root: Option<StateId>,
    retry: Option<Arc<dyn RetryPolicy>>,
    step: i64,
    status: RunStatus,
}

impl RouteRunner {
    pub(crate) fn new(
        route_id: String,
        root: StateId,
        recovery_root: Option<StateId>,
        retry: Option<Arc<dyn RetryPolicy>>,
    ) -> Self {
        Self {
            route_id,
            root,
            recovery_root,
            retry,
            step: 0,
            status: RunStatus::Unknown,
        }
    }

    /// Resume a run from a restored snapshot instead of the route's start.
    pub(crate) fn resume(
        route_id: String,
        state: StateId,
        recovery_root: Option<StateId>,
        retry: Option<Arc<dyn RetryPolicy>>,
        step: i64,
        status: RunStatus,
    ) -> Self {
        Self {
            route_id,
            root: state,
            recovery_root,
            retry,
            step,
            status,
        }
    }

    pub(crate) fn run(
        &mut self,
        graph: &RouteGraph,
        ctx: &Context,
        sink: Option<&ErrorSink>,
        caretaker: &dyn Caretaker,
        cancel: &CancelToken,
    ) -> RunStatus {
        let mut machine = StateMachine::new(graph, self.root);
        if let Some(policy) = &self.retry {
            machine = machine.with_retry_policy(Arc::clone(policy));
        }
        machine.init(self.root, ctx);
        debug!(route = %self.route_id, gid = %ctx.gid(), "run started");

        while machine.has_next(ctx) {
            if cancel.is_cancelled() {
                warn!(route = %self.route_id, "run cancelled between steps");
                self.status = RunStatus::Fail;
                break;
            }

            let acting = machine.current();
            let was_rollback = ctx.is_rollback();
            let result = machine.next(ctx);
            let (saved_state, saved_ctx) = machine.memento(ctx);

            if result.is_err() || was_rollback {
                self.step -= 1;
            } else {
                self.step += 1;
            }
            if result.is_err() || self.step < 0 {
                self.status = RunStatus::Fail;
            }

            self.persist_snapshot(saved_state, saved_ctx.clone(), ctx, caretaker, sink);

            if let Err(source) = result {
                let state = graph.state(acting).name().to_string();
                warn!(route = %self.route_id, state = %state, "step failed, walking back");
                forward(
                    sink,
                    RunError::Step {
                        route: self.route_id.clone(),
                        state,
                        source,
                    },
                );

                if let Some(recovery_root) = self.recovery_root {
                    self.run_recovery(&mut machine, graph, recovery_root, saved_ctx, sink, cancel);
                    machine.init(saved_state, ctx);
                }
            }
        }

        if self.status != RunStatus::Fail {
            self.status = RunStatus::Success;
        }
        self.persist_snapshot(machine.current(), ctx.snapshot(), ctx, caretaker, sink);
        debug!(route = %self.route_id, status = %self.status, step = self.step, "run finished");

        self.status
    }

    /// Drain the recovery graph on a clone of the captured context. The
    /// machine status is reset so the recovery route walks forward even
    /// though the main walk is rolling back; recovery errors are forwarded
    /// but never trigger a second level of recovery.
    fn run_recovery(
        &self,
        machine: &mut StateMachine<'_>,
        graph: &RouteGraph,
        recovery_root: StateId,
        captured: ContextSnapshot,
        sink: Option<&ErrorSink>,
        cancel: &CancelToken,
    ) {
        debug!(route = %self.route_id, "diverting into recovery route");

        let recovery_ctx = Context::from(captured);
        recovery_ctx.set_machine_status(MachineStatus::InProgress);
        machine.init(recovery_root, &recovery_ctx);

        while machine.has_next(&recovery_ctx) {
            if cancel.is_cancelled() {
                break;
            }

            let state = graph.state(machine.current()).name().to_string();
            if let Err(source) = machine.next(&recovery_ctx) {
                forward(
                    sink,
                    RunError::Step {
                        route: RECOVERY_ROUTE_ID.to_string(),
                        state,
                        source,
                    },
                );
            }
        }
    }

    fn persist_snapshot(
        &self,
        state: StateId,
        context: ContextSnapshot,
        ctx: &Context,
        caretaker: &dyn Caretaker,
        sink: Option<&ErrorSink>,
    ) {
        let snapshot = Snapshot {
            route_id: self.route_id.clone(),
            step: self.step,
            state,
            machine: ctx.machine_status().unwrap_or(MachineStatus::Start),
            status: self.status,
            context,
        };

        match snapshot.encode() {
            Ok(data) => {
                if let Err(source) = caretaker.persist(&self.route_id, &data) {
                    warn!(route = %self.route_id, error = %source, "snapshot persist failed");
                    forward(
                        sink,
                        RunError::Persist {
                            route: self.route_id.clone(),
                            source,
                        },
                    );
                }
            }
            Err(source) => forward(
                sink,
                RunError::Encode {
                    route: self.route_id.clone(),
                    source,
                },
            ),
        }
    }
}

fn forward(sink: Option<&ErrorSink>, error: RunError) {
    if let Some(sink) = sink {
        if sink.send(error).is_err() {
            debug!("error sink receiver dropped, discarding run error");
        }
    }
}
