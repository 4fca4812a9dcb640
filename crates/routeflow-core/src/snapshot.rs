use serde::{Deserialize, Serialize};

use crate::context::ContextSnapshot;
use crate::error::RestoreError;
use crate::graph::StateId;
use crate::status::{MachineStatus, RunStatus};

/// A serializable capture of execution progress, persisted after every step
/// and used for warm restart.
///
/// `step` keeps the linear progress marker (−1 is the sentinel reached when a
/// rollback underflows past the first step); `state` is the current-state
/// reference into the merged arena that makes graph resume exact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub route_id: String,
    pub step: i64,
    pub state: StateId,
    pub machine: MachineStatus,
    pub status: RunStatus,
    pub context: ContextSnapshot,
}

impl Snapshot {
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be encoded as JSON.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode and validate a persisted snapshot.
    ///
    /// # Errors
    ///
    /// Rejects, each independently: data that does not parse (which covers
    /// any machine-state value outside the four-element enum), an empty
    /// route id, and a negative step. Callers treat every rejection as
    /// "no snapshot" and start cold.
    pub fn restore(data: &str) -> Result<Self, RestoreError> {
        let snapshot: Snapshot = serde_json::from_str(data).map_err(RestoreError::Decode)?;

        if snapshot.route_id.is_empty() {
            return Err(RestoreError::EmptyRouteId);
        }

        if snapshot.step < 0 {
            return Err(RestoreError::NegativeStep(snapshot.step));
        }

        Ok(snapshot)
    }
}
