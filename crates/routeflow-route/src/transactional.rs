use std::sync::Arc;

use routeflow_core::{Context, Guard, Priority, RouteGraph, StateId, TransitionRole};

use crate::built::{BuiltRoute, Endpoint};
use crate::error::RouteBuildError;
use crate::stack::{PredicateStack, branch_tail};
use crate::step::SagaStep;

/// Which wiring the next `add_next_step` performs.
enum BuildMode {
    Main,
    When,
    Else,
    End,
}

/// Continuation guard returned by `when`/`otherwise`/`end`: the only legal
/// next call is `add_next_step`, which hands the route back.
pub struct PendingStep<R> {
    pub(crate) route: R,
}

impl PendingStep<TransactionalRoute> {
    #[must_use]
    pub fn add_next_step(self, step: impl SagaStep + 'static) -> TransactionalRoute {
        self.route.add_next_step(step)
    }
}

/// Fluent builder for a compensable workflow graph.
///
/// Every forward edge gets a matching reverse edge gated on rollback, so the
/// walk can retrace any path it took forward. Construction defects are
/// deferred; `build()` surfaces the first one.
pub struct TransactionalRoute {
    id: String,
    graph: RouteGraph,
    start: Option<StateId>,
    last: Option<StateId>,
    mode: BuildMode,
    stack: PredicateStack,
    endpoints: Vec<Endpoint>,
    defect: Option<RouteBuildError>,
}

impl TransactionalRoute {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            graph: RouteGraph::new(),
            start: None,
            last: None,
            mode: BuildMode::Main,
            stack: PredicateStack::default(),
            endpoints: Vec::new(),
            defect: None,
        }
    }

    /// Add a step. The first step becomes the start state and gets no
    /// backward edge; a start state never needs a rollback target.
    #[must_use]
    pub fn add_next_step(mut self, step: impl SagaStep + 'static) -> Self {
        if self.defect.is_some() {
            return self;
        }

        let name = format!("{}_{}", self.id, step.name());
        let state = self.graph.add_state(name, define_action(step));

        match self.mode {
            BuildMode::When => self.wire_when(state),
            BuildMode::Else => self.wire_otherwise(state),
            BuildMode::End => self.wire_join(state),
            BuildMode::Main => {
                if self.start.is_none() {
                    self.start = Some(state);
                } else if let Some(last) = self.last {
                    self.define_two_way(last, Priority::Default, Arc::new(|_ctx| true), state);
                }
            }
        }

        self.last = Some(state);
        self.mode = BuildMode::Main;
        self
    }

    /// Open a conditional branch off the current last state.
    #[must_use]
    pub fn when(
        mut self,
        predicate: impl Fn(&Context) -> bool + Send + Sync + 'static,
    ) -> PendingStep<Self> {
        if self.defect.is_none() {
            match self.last {
                Some(last) => {
                    self.stack.push(Arc::new(predicate), last);
                    self.mode = BuildMode::When;
                }
                None => {
                    self.defect = Some(RouteBuildError::WhenBeforeFirstStep {
                        route: self.id.clone(),
                    });
                }
            }
        }

        PendingStep { route: self }
    }

    /// Open the negated branch of the innermost `when`. At most one per
    /// `when`.
    #[must_use]
    pub fn otherwise(mut self) -> PendingStep<Self> {
        if self.defect.is_none() {
            match self.stack.last_mut() {
                Some(frame) if !frame.otherwise_used => {
                    frame.otherwise_used = true;
                    self.mode = BuildMode::Else;
                }
                Some(_) => {
                    self.defect = Some(RouteBuildError::DuplicateOtherwise {
                        route: self.id.clone(),
                    });
                }
                None => {
                    self.defect = Some(RouteBuildError::UnmatchedOtherwise {
                        route: self.id.clone(),
                    });
                }
            }
        }

        PendingStep { route: self }
    }

    /// Close the innermost branch; the next step becomes its join state.
    #[must_use]
    pub fn end(mut self) -> PendingStep<Self> {
        if self.defect.is_none() {
            if self.stack.is_empty() {
                self.defect = Some(RouteBuildError::UnmatchedEnd {
                    route: self.id.clone(),
                });
            } else {
                self.mode = BuildMode::End;
            }
        }

        PendingStep { route: self }
    }

    /// Record a hand-off endpoint at the current last state, consumed by the
    /// orchestrator during initialization.
    #[must_use]
    pub fn to(mut self, route_id: impl Into<String>) -> Self {
        let target = route_id.into();
        if self.defect.is_none() {
            match self.last {
                Some(state) => self.endpoints.push(Endpoint { to: target, state }),
                None => {
                    self.defect = Some(RouteBuildError::EndpointBeforeFirstStep {
                        route: self.id.clone(),
                        target,
                    });
                }
            }
        }

        self
    }

    /// Finish construction.
    ///
    /// A still-open `when` is fine: a branch without `end` simply runs to the
    /// route's end.
    ///
    /// # Errors
    ///
    /// Surfaces the first deferred defect or an empty route.
    pub fn build(self) -> Result<BuiltRoute, RouteBuildError> {
        if let Some(defect) = self.defect {
            return Err(defect);
        }

        let Some(start) = self.start else {
            return Err(RouteBuildError::EmptyRoute { route: self.id });
        };

        Ok(BuiltRoute::new(
            self.id,
            self.graph,
            start,
            self.endpoints,
            true,
        ))
    }

    fn wire_when(&mut self, state: StateId) {
        let Some(frame) = self.stack.last() else {
            return;
        };
        let origin = frame.state;
        let predicate = Arc::clone(&frame.predicate);

        self.define_two_way(origin, Priority::Condition, predicate, state);
    }

    fn wire_otherwise(&mut self, state: StateId) {
        let Some(frame) = self.stack.last() else {
            return;
        };
        let origin = frame.state;
        let predicate = Arc::clone(&frame.predicate);
        let negated: Guard = Arc::new(move |ctx: &Context| !predicate(ctx));

        self.define_two_way(origin, Priority::Condition, negated, state);
    }

    //        origin          origin
    //       /      \           |   \
    //     not      yes         no   yes
    //  included     |          |    |
    //       \      /           |   /
    //       join state       join state
    fn wire_join(&mut self, state: StateId) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let origin = frame.state;

        let branch_entries: Vec<StateId> = self
            .graph
            .state(origin)
            .transitions()
            .iter()
            .filter(|t| t.priority() == Priority::Condition)
            .map(|t| t.to())
            .collect();

        let tails: Vec<StateId> = branch_entries
            .iter()
            .map(|&entry| branch_tail(&self.graph, entry))
            .collect();

        for tail in tails {
            self.define_two_way(tail, Priority::Default, Arc::new(|_ctx| true), state);
        }

        // No otherwise: cover the "condition false, no branch taken" case
        // with a direct edge from the origin.
        if branch_entries.len() < 2 {
            self.define_two_way(origin, Priority::Default, Arc::new(|_ctx| true), state);
        }
    }

    fn define_two_way(&mut self, src: StateId, priority: Priority, predicate: Guard, dst: StateId) {
        let forward: Guard = Arc::new(move |ctx: &Context| predicate(ctx) && !ctx.is_rollback());
        self.graph
            .create_transition(src, dst, priority, TransitionRole::Forward, forward);

        self.graph.create_transition(
            dst,
            src,
            Priority::Default,
            TransitionRole::Compensate,
            Arc::new(Context::is_rollback),
        );
    }
}

/// Wrap a step into a single state action that dispatches on the rollback
/// flag: undo while compensating, do otherwise.
fn define_action(step: impl SagaStep + 'static) -> routeflow_core::Action {
    Box::new(move |ctx: &Context| {
        if ctx.is_rollback() {
            step.compensate(ctx);
            return Ok(());
        }

        step.execute(ctx)
    })
}
