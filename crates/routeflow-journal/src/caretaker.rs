use serde::{Deserialize, Serialize};

use crate::error::JournalError;

/// Append-only persistence of execution snapshots, keyed by workflow id.
///
/// Methods take `&self`: a caretaker is injected once into the orchestrator
/// and may be reached from concurrent runs, so implementations guard their
/// state internally.
pub trait Caretaker: Send + Sync {
    /// Append one timestamped record for `id`. History is never rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or written.
    fn persist(&self, id: &str, data: &str) -> Result<(), JournalError>;

    /// Latest persisted payload for `id`, or `None` if the log holds no
    /// record for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or a record is malformed.
    fn get(&self, id: &str) -> Result<Option<String>, JournalError>;

    /// Flush and close.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered records cannot be flushed.
    fn shutdown(&self) -> Result<(), JournalError>;
}

impl<T: Caretaker + ?Sized> Caretaker for std::sync::Arc<T> {
    fn persist(&self, id: &str, data: &str) -> Result<(), JournalError> {
        (**self).persist(id, data)
    }

    fn get(&self, id: &str) -> Result<Option<String>, JournalError> {
        (**self).get(id)
    }

    fn shutdown(&self) -> Result<(), JournalError> {
        (**self).shutdown()
    }
}

/// One journal line: `{timestamp, id, data}` as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// RFC3339 write time.
    pub timestamp: String,
    /// Workflow id the record belongs to.
    pub id: String,
    /// Encoded snapshot payload.
    pub data: String,
}
