use std::collections::HashSet;

use routeflow_core::{Guard, Priority, RouteGraph, StateId, TransitionRole};

/// One open `when`: the predicate and the state the branch forked from.
pub(crate) struct BranchFrame {
    pub(crate) predicate: Guard,
    pub(crate) state: StateId,
    pub(crate) otherwise_used: bool,
}

/// Stack of open branch frames. Depth equals `when` nesting depth.
#[derive(Default)]
pub(crate) struct PredicateStack {
    frames: Vec<BranchFrame>,
}

impl PredicateStack {
    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub(crate) fn push(&mut self, predicate: Guard, state: StateId) {
        self.frames.push(BranchFrame {
            predicate,
            state,
            otherwise_used: false,
        });
    }

    pub(crate) fn last(&self) -> Option<&BranchFrame> {
        self.frames.last()
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut BranchFrame> {
        self.frames.last_mut()
    }

    pub(crate) fn pop(&mut self) -> Option<BranchFrame> {
        self.frames.pop()
    }
}

/// Branch-tail discovery: follow Default-priority forward edges from a
/// branch's entry until a state has none. The role tag makes the forward
/// edge distinguishable from its compensating twin without probing guards.
/// The visited set keeps a cyclic sub-chain from hanging construction.
pub(crate) fn branch_tail(graph: &RouteGraph, from: StateId) -> StateId {
    let mut current = from;
    let mut visited = HashSet::new();

    loop {
        if !visited.insert(current) {
            return current;
        }

        let next = graph
            .state(current)
            .transitions()
            .iter()
            .find(|t| t.priority() == Priority::Default && t.role() == TransitionRole::Forward)
            .map(routeflow_core::Transition::to);

        match next {
            Some(next) => current = next,
            None => return current,
        }
    }
}
