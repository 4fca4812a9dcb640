use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::StepError;

/// Executable behavior attached to a state.
pub type Action = Box<dyn Fn(&Context) -> Result<(), StepError> + Send + Sync>;

/// Predicate gating a transition.
///
/// Shared (`Arc`) because branch construction reuses one predicate for a
/// `when` edge and its negated `otherwise` edge.
pub type Guard = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Handle to a state in a [`RouteGraph`] arena.
///
/// Ids are plain arena indices: cheap to copy, serializable inside snapshots,
/// and free of ownership cycles even for self-loops and cross-branch loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(usize);

impl StateId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }

    /// Remap this id into a merged arena. Pair with the offset returned by
    /// [`RouteGraph::absorb`].
    #[must_use]
    pub fn shifted(self, offset: usize) -> Self {
        Self(self.0 + offset)
    }
}

/// Transition priority tier. `Condition` edges are tried before `Default`
/// edges; insertion order breaks ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Default = 1,
    Condition = 2,
}

/// Construction-time tag distinguishing the forward edge of a pair from its
/// compensating reverse edge. Tail discovery in the builders keys off this
/// tag; runtime transition selection ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRole {
    Forward,
    Compensate,
}

/// A directed, guarded edge between two states.
pub struct Transition {
    to: StateId,
    priority: Priority,
    role: TransitionRole,
    guard: Guard,
}

impl Transition {
    #[must_use]
    pub fn to(&self) -> StateId {
        self.to
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[must_use]
    pub fn role(&self) -> TransitionRole {
        self.role
    }

    #[must_use]
    pub fn should_take(&self, ctx: &Context) -> bool {
        (self.guard)(ctx)
    }
}

/// A named state wrapping an action and its outgoing transitions.
pub struct State {
    name: String,
    pub(crate) action: Action,
    transitions: Vec<Transition>,
}

impl State {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }
}

/// Arena holding the states of one or more routes.
///
/// Built once, immutable during execution. Ids handed out by [`add_state`]
/// (and remapped by [`absorb`]) are valid for the lifetime of the arena.
///
/// [`add_state`]: RouteGraph::add_state
/// [`absorb`]: RouteGraph::absorb
#[derive(Default)]
pub struct RouteGraph {
    states: Vec<State>,
}

impl RouteGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(&mut self, name: impl Into<String>, action: Action) -> StateId {
        let id = StateId(self.states.len());
        self.states.push(State {
            name: name.into(),
            action,
            transitions: Vec::new(),
        });
        id
    }

    /// Append an edge. No deduplication; this is the only graph-mutation
    /// primitive and everything else composes calls to it.
    pub fn create_transition(
        &mut self,
        from: StateId,
        to: StateId,
        priority: Priority,
        role: TransitionRole,
        guard: Guard,
    ) {
        self.states[from.0].transitions.push(Transition {
            to,
            priority,
            role,
            guard,
        });
    }

    #[must_use]
    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    #[must_use]
    pub fn contains(&self, id: StateId) -> bool {
        id.0 < self.states.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Merge another arena into this one, remapping its ids by the returned
    /// offset. Used by the orchestrator to link independently built routes
    /// into a single walkable graph.
    pub fn absorb(&mut self, other: RouteGraph) -> usize {
        let offset = self.states.len();
        for mut state in other.states {
            for transition in &mut state.transitions {
                transition.to = transition.to.shifted(offset);
            }
            self.states.push(state);
        }

        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Action {
        Box::new(|_ctx| Ok(()))
    }

    fn always() -> Guard {
        Arc::new(|_ctx| true)
    }

    #[test]
    fn condition_priority_outranks_default() {
        assert!(Priority::Condition > Priority::Default);
    }

    #[test]
    fn add_state_hands_out_sequential_ids() {
        let mut graph = RouteGraph::new();
        let a = graph.add_state("a", noop());
        let b = graph.add_state("b", noop());

        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn create_transition_appends_without_dedup() {
        let mut graph = RouteGraph::new();
        let a = graph.add_state("a", noop());
        let b = graph.add_state("b", noop());

        graph.create_transition(a, b, Priority::Default, TransitionRole::Forward, always());
        graph.create_transition(a, b, Priority::Default, TransitionRole::Forward, always());

        assert_eq!(graph.state(a).transitions().len(), 2);
    }

    #[test]
    fn absorb_offsets_ids_and_edges() {
        let mut left = RouteGraph::new();
        left.add_state("left_only", noop());

        let mut right = RouteGraph::new();
        let r0 = right.add_state("r0", noop());
        let r1 = right.add_state("r1", noop());
        right.create_transition(r0, r1, Priority::Default, TransitionRole::Forward, always());

        let offset = left.absorb(right);

        assert_eq!(offset, 1);
        let merged_r0 = r0.shifted(offset);
        assert_eq!(left.state(merged_r0).name(), "r0");
        assert_eq!(
            left.state(merged_r0).transitions()[0].to(),
            r1.shifted(offset)
        );
    }

    #[test]
    fn state_id_survives_serde_as_bare_index() -> anyhow::Result<()> {
        let id = StateId(7);
        assert_eq!(serde_json::to_string(&id)?, "7");

        let back: StateId = serde_json::from_str("7")?;
        assert_eq!(back, id);
        Ok(())
    }
}
