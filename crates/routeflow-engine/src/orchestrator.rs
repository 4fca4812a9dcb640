use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use routeflow_core::{
    Context, Priority, RetryPolicy, RouteGraph, RunStatus, Snapshot, StateId, TransitionRole,
};
use routeflow_journal::Caretaker;
use routeflow_route::{BuiltRoute, Endpoint, NonTransactionalRoute};

use crate::cancel::CancelToken;
use crate::error::{ErrorSink, OrchestratorError};
use crate::runner::RouteRunner;

/// Reserved id the recovery route is installed under; regular routes may not
/// claim it.
pub const RECOVERY_ROUTE_ID: &str = "SYS_RECOVERY_ROUTE";

struct RouteMeta {
    start: StateId,
    endpoints: Vec<Endpoint>,
    compensable: bool,
}

/// Registry of named routes and the execution entry point.
///
/// Built in a single-writer phase (`register` the routes, then `initialize`
/// once) and read-only afterward, so `exec` takes `&self` and needs no
/// locking. The caretaker is an injected dependency whose lifecycle the
/// orchestrator owns.
pub struct Orchestrator {
    graph: RouteGraph,
    routes: IndexMap<String, RouteMeta>,
    recovery_start: Option<StateId>,
    caretaker: Box<dyn Caretaker>,
    retry: Option<Arc<dyn RetryPolicy>>,
    initialized: bool,
}

impl Orchestrator {
    #[must_use]
    pub fn new(caretaker: Box<dyn Caretaker>) -> Self {
        Self {
            graph: RouteGraph::new(),
            routes: IndexMap::new(),
            recovery_start: None,
            caretaker,
            retry: None,
            initialized: false,
        }
    }

    /// Install a retry policy consulted for every step of every run.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Register a built route, absorbing its graph into the merged arena.
    ///
    /// # Errors
    ///
    /// Rejects a duplicate id, the reserved recovery id, and registration
    /// after `initialize`.
    pub fn register(&mut self, route: BuiltRoute) -> Result<(), OrchestratorError> {
        if self.initialized {
            return Err(OrchestratorError::AlreadyInitialized);
        }
        if route.id() == RECOVERY_ROUTE_ID {
            return Err(OrchestratorError::ReservedRouteId(route.id().to_string()));
        }
        if self.routes.contains_key(route.id()) {
            return Err(OrchestratorError::DuplicateRoute(route.id().to_string()));
        }

        let (id, graph, start, endpoints, compensable) = route.into_parts();
        let offset = self.graph.absorb(graph);
        let endpoints = endpoints
            .into_iter()
            .map(|endpoint| Endpoint {
                to: endpoint.to,
                state: endpoint.state.shifted(offset),
            })
            .collect();

        debug!(route = %id, offset, "route registered");
        self.routes.insert(
            id,
            RouteMeta {
                start: start.shifted(offset),
                endpoints,
                compensable,
            },
        );

        Ok(())
    }

    /// Install the recovery route (a no-op one if none is supplied) and wire
    /// every recorded endpoint: a forward hop into the target's start, plus a
    /// rollback-gated back-edge when the target is compensable, so failure
    /// inside the callee continues the compensation walk into the caller.
    ///
    /// # Errors
    ///
    /// Fails on an endpoint naming an unregistered route, or when called
    /// twice.
    pub fn initialize(&mut self, recovery: Option<BuiltRoute>) -> Result<(), OrchestratorError> {
        if self.initialized {
            return Err(OrchestratorError::AlreadyInitialized);
        }

        let recovery = match recovery {
            Some(route) => route,
            None => default_recovery_route()?,
        };
        let (_, recovery_graph, recovery_start, _, _) = recovery.into_parts();
        let offset = self.graph.absorb(recovery_graph);
        self.recovery_start = Some(recovery_start.shifted(offset));

        let mut wiring: Vec<(StateId, StateId, bool)> = Vec::new();
        for (id, meta) in &self.routes {
            for endpoint in &meta.endpoints {
                let Some(target) = self.routes.get(&endpoint.to) else {
                    return Err(OrchestratorError::UnknownEndpointTarget {
                        route: id.clone(),
                        target: endpoint.to.clone(),
                    });
                };
                wiring.push((endpoint.state, target.start, target.compensable));
            }
        }

        for (source, target_start, compensable) in wiring {
            self.graph.create_transition(
                source,
                target_start,
                Priority::Default,
                TransitionRole::Forward,
                Arc::new(|_ctx| true),
            );

            if compensable {
                self.graph.create_transition(
                    target_start,
                    source,
                    Priority::Default,
                    TransitionRole::Compensate,
                    Arc::new(Context::is_rollback),
                );
            }
        }

        self.initialized = true;
        info!(routes = self.routes.len(), "orchestrator initialized");
        Ok(())
    }

    /// Run the route `from` to completion on `ctx`, forwarding run-time
    /// errors to `sink`.
    ///
    /// # Errors
    ///
    /// An unknown route id is a fatal configuration error, not a run
    /// outcome; so is calling before `initialize`.
    pub fn exec(
        &self,
        from: &str,
        ctx: &Context,
        sink: Option<&ErrorSink>,
    ) -> Result<RunStatus, OrchestratorError> {
        self.exec_with_cancel(from, ctx, sink, &CancelToken::new())
    }

    /// [`exec`](Self::exec) with a cancellation token checked between steps.
    ///
    /// # Errors
    ///
    /// Same as [`exec`](Self::exec).
    pub fn exec_with_cancel(
        &self,
        from: &str,
        ctx: &Context,
        sink: Option<&ErrorSink>,
        cancel: &CancelToken,
    ) -> Result<RunStatus, OrchestratorError> {
        if !self.initialized {
            return Err(OrchestratorError::NotInitialized);
        }
        let meta = self
            .routes
            .get(from)
            .ok_or_else(|| OrchestratorError::UnknownRoute(from.to_string()))?;

        let mut runner = RouteRunner::new(
            from.to_string(),
            meta.start,
            self.recovery_start,
            self.retry.clone(),
        );

        Ok(runner.run(&self.graph, ctx, sink, self.caretaker.as_ref(), cancel))
    }

    /// Attempt a warm restart from the latest persisted snapshot for
    /// `route_id`. Returns `None` (start cold) when no snapshot exists or
    /// the stored one fails restore validation; never a hard failure for a
    /// rejected snapshot.
    ///
    /// # Errors
    ///
    /// Unknown route ids and journal read failures are surfaced as
    /// configuration errors.
    pub fn warm_up(
        &self,
        route_id: &str,
        sink: Option<&ErrorSink>,
    ) -> Result<Option<RunStatus>, OrchestratorError> {
        if !self.initialized {
            return Err(OrchestratorError::NotInitialized);
        }
        if !self.routes.contains_key(route_id) {
            return Err(OrchestratorError::UnknownRoute(route_id.to_string()));
        }

        let data = self
            .caretaker
            .get(route_id)
            .map_err(|source| OrchestratorError::Journal {
                route: route_id.to_string(),
                source,
            })?;
        let Some(data) = data else {
            return Ok(None);
        };

        let snapshot = match Snapshot::restore(&data) {
            Ok(snapshot) => snapshot,
            Err(reason) => {
                warn!(route = %route_id, %reason, "snapshot rejected, starting cold");
                return Ok(None);
            }
        };

        if snapshot.route_id != route_id || !self.graph.contains(snapshot.state) {
            warn!(route = %route_id, "snapshot does not match the registered graph, starting cold");
            return Ok(None);
        }

        info!(route = %route_id, step = snapshot.step, "warm restart from snapshot");
        let ctx = Context::from(snapshot.context);
        let mut runner = RouteRunner::resume(
            route_id.to_string(),
            snapshot.state,
            self.recovery_start,
            self.retry.clone(),
            snapshot.step,
            snapshot.status,
        );

        Ok(Some(runner.run(
            &self.graph,
            &ctx,
            sink,
            self.caretaker.as_ref(),
            &CancelToken::new(),
        )))
    }

    /// Flush and close the injected caretaker.
    ///
    /// # Errors
    ///
    /// Surfaces the journal's flush failure.
    pub fn shutdown(&self) -> Result<(), OrchestratorError> {
        self.caretaker
            .shutdown()
            .map_err(OrchestratorError::Shutdown)
    }
}

fn default_recovery_route() -> Result<BuiltRoute, OrchestratorError> {
    NonTransactionalRoute::new(RECOVERY_ROUTE_ID)
        .add_next_step("noop", |_ctx| Ok(()))
        .build()
        .map_err(OrchestratorError::InvalidRecoveryRoute)
}
