use routeflow_core::{RouteGraph, StateId};

/// A recorded cross-workflow hand-off point: the orchestrator wires the
/// source state to the target route's start during initialization.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Target route id.
    pub to: String,
    /// Source state inside the owning route's graph.
    pub state: StateId,
}

/// An immutable, fully-wired route produced by a builder's `build()`.
pub struct BuiltRoute {
    id: String,
    graph: RouteGraph,
    start: StateId,
    endpoints: Vec<Endpoint>,
    compensable: bool,
}

impl BuiltRoute {
    pub(crate) fn new(
        id: String,
        graph: RouteGraph,
        start: StateId,
        endpoints: Vec<Endpoint>,
        compensable: bool,
    ) -> Self {
        Self {
            id,
            graph,
            start,
            endpoints,
            compensable,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn graph(&self) -> &RouteGraph {
        &self.graph
    }

    #[must_use]
    pub fn start(&self) -> StateId {
        self.start
    }

    #[must_use]
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Whether the route wires compensating reverse edges; the orchestrator
    /// only propagates rollback back across a hand-off into compensable
    /// targets.
    #[must_use]
    pub fn compensable(&self) -> bool {
        self.compensable
    }

    /// Dismantle into `(id, graph, start, endpoints, compensable)` for
    /// absorption into a merged arena.
    #[must_use]
    pub fn into_parts(self) -> (String, RouteGraph, StateId, Vec<Endpoint>, bool) {
        (
            self.id,
            self.graph,
            self.start,
            self.endpoints,
            self.compensable,
        )
    }
}
