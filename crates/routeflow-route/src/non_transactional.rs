use std::sync::Arc;

use routeflow_core::{Context, Guard, Priority, RouteGraph, StateId, StepError, TransitionRole};

use crate::built::{BuiltRoute, Endpoint};
use crate::error::RouteBuildError;
use crate::stack::{PredicateStack, branch_tail};
use crate::transactional::PendingStep;

enum BuildMode {
    Main,
    When,
    Else,
    End,
}

/// Fluent builder for a forward-only workflow graph.
///
/// Steps carry no undo action and no reverse edges are wired, so the route
/// does not participate in compensation: a failure inside it closes the walk
/// instead of retracing, and the orchestrator will not propagate rollback
/// back across a hand-off into it. Suited to recovery routes and
/// fire-and-forget pipelines.
pub struct NonTransactionalRoute {
    id: String,
    graph: RouteGraph,
    start: Option<StateId>,
    last: Option<StateId>,
    mode: BuildMode,
    stack: PredicateStack,
    endpoints: Vec<Endpoint>,
    defect: Option<RouteBuildError>,
}

impl PendingStep<NonTransactionalRoute> {
    #[must_use]
    pub fn add_next_step(
        self,
        name: impl Into<String>,
        action: impl Fn(&Context) -> Result<(), StepError> + Send + Sync + 'static,
    ) -> NonTransactionalRoute {
        self.route.add_next_step(name, action)
    }
}

impl NonTransactionalRoute {
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

    /// Add a do-only step.
    #[must_use]
    pub fn add_next_step(
        mut self,
        name: impl Into<String>,
        action: impl Fn(&Context) -> Result<(), StepError> + Send + Sync + 'static,
    ) -> Self {
        if self.defect.is_some() {
            return self;
        }

        let name = format!("{}_{}", self.id, name.into());
        let state = self.graph.add_state(name, Box::new(action));

        match self.mode {
            BuildMode::When => self.wire_when(state),
            BuildMode::Else => self.wire_otherwise(state),
            BuildMode::End => self.wire_join(state),
            BuildMode::Main => {
                if self.start.is_none() {
                    self.start = Some(state);
                } else if let Some(last) = self.last {
                    self.graph.create_transition(
                        last,
                        state,
                        Priority::Default,
                        TransitionRole::Forward,
                        Arc::new(|_ctx| true),
                    );
                }
            }
        }

        self.last = Some(state);
        self.mode = BuildMode::Main;
        self
    }

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
            false,
        ))
    }

    fn wire_when(&mut self, state: StateId) {
        let Some(frame) = self.stack.last() else {
            return;
        };
        let origin = frame.state;
        let predicate = Arc::clone(&frame.predicate);

        self.graph.create_transition(
            origin,
            state,
            Priority::Condition,
            TransitionRole::Forward,
            predicate,
        );
    }

    fn wire_otherwise(&mut self, state: StateId) {
        let Some(frame) = self.stack.last() else {
            return;
        };
        let origin = frame.state;
        let predicate = Arc::clone(&frame.predicate);
        let negated: Guard = Arc::new(move |ctx: &Context| !predicate(ctx));

        self.graph.create_transition(
            origin,
            state,
            Priority::Condition,
            TransitionRole::Forward,
            negated,
        );
    }

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
            self.graph.create_transition(
                tail,
                state,
                Priority::Default,
                TransitionRole::Forward,
                Arc::new(|_ctx| true),
            );
        }

        if branch_entries.len() < 2 {
            self.graph.create_transition(
                origin,
                state,
                Priority::Default,
                TransitionRole::Forward,
                Arc::new(|_ctx| true),
            );
        }
    }
}
