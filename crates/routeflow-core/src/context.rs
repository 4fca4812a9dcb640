use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ContextError;
use crate::status::MachineStatus;

/// Reserved variable name carrying the walking engine's [`MachineStatus`].
///
/// The status lives inside the variable map, not beside it, so a context copy
/// taken for a snapshot carries the exact replay state.
pub const MACHINE_STATUS_KEY: &str = "MACHINE_STATUS";

/// Concurrency-safe, per-execution key/value scope.
///
/// A context carries an opaque unique id (immutable after creation), a
/// lock-guarded variable map whose entries are overwritten but never removed,
/// and a set of once-only constants. The same context may flow through a
/// cross-workflow hand-off, so all access goes through the lock.
pub struct Context {
    gid: String,
    variables: Mutex<IndexMap<String, Value>>,
    constants: Mutex<IndexMap<String, Value>>,
}

impl Context {
    /// Create a context with a freshly generated unique id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            gid: Uuid::new_v4().to_string(),
            variables: Mutex::new(IndexMap::new()),
            constants: Mutex::new(IndexMap::new()),
        }
    }

    /// Create a context with a caller-supplied id.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::EmptyGid`] if `gid` is empty.
    pub fn with_gid(gid: impl Into<String>) -> Result<Self, ContextError> {
        let gid = gid.into();
        if gid.is_empty() {
            return Err(ContextError::EmptyGid);
        }

        Ok(Self {
            gid,
            variables: Mutex::new(IndexMap::new()),
            constants: Mutex::new(IndexMap::new()),
        })
    }

    #[must_use]
    pub fn gid(&self) -> &str {
        &self.gid
    }

    #[must_use]
    pub fn variable(&self, key: &str) -> Option<Value> {
        self.vars().get(key).cloned()
    }

    pub fn set_variable(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars().insert(key.into(), value.into());
    }

    #[must_use]
    pub fn constant(&self, key: &str) -> Option<Value> {
        self.consts().get(key).cloned()
    }

    /// Set a constant; constants may be written exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::ConstantAlreadySet`] if `key` already holds a
    /// value.
    pub fn set_constant(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), ContextError> {
        let key = key.into();
        let mut consts = self.consts();
        if consts.contains_key(&key) {
            return Err(ContextError::ConstantAlreadySet(key));
        }

        consts.insert(key, value.into());
        Ok(())
    }

    #[must_use]
    pub fn machine_status(&self) -> Option<MachineStatus> {
        self.variable(MACHINE_STATUS_KEY)
            .as_ref()
            .and_then(Value::as_str)
            .and_then(MachineStatus::parse)
    }

    pub fn set_machine_status(&self, status: MachineStatus) {
        self.set_variable(MACHINE_STATUS_KEY, status.as_str());
    }

    /// True while the walk is compensating.
    #[must_use]
    pub fn is_rollback(&self) -> bool {
        self.machine_status() == Some(MachineStatus::Rollback)
    }

    /// Deep copy of the context for snapshotting.
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            gid: self.gid.clone(),
            variables: self.vars().clone(),
            constants: self.consts().clone(),
        }
    }

    fn vars(&self) -> MutexGuard<'_, IndexMap<String, Value>> {
        self.variables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn consts(&self) -> MutexGuard<'_, IndexMap<String, Value>> {
        self.constants.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable deep copy of a [`Context`], stored inside snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub gid: String,
    pub variables: IndexMap<String, Value>,
    #[serde(default)]
    pub constants: IndexMap<String, Value>,
}

impl From<ContextSnapshot> for Context {
    fn from(snapshot: ContextSnapshot) -> Self {
        Self {
            gid: snapshot.gid,
            variables: Mutex::new(snapshot.variables),
            constants: Mutex::new(snapshot.constants),
        }
    }
}
