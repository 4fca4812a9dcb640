use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::caretaker::{Caretaker, LogRecord};
use crate::error::JournalError;

/// In-memory caretaker for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryCaretaker {
    records: Mutex<HashMap<String, Vec<LogRecord>>>,
}

impl MemoryCaretaker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All persisted payloads for `id`, oldest first.
    #[must_use]
    pub fn entries(&self, id: &str) -> Vec<String> {
        self.records()
            .get(id)
            .map(|records| records.iter().map(|r| r.data.clone()).collect())
            .unwrap_or_default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, Vec<LogRecord>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Caretaker for MemoryCaretaker {
    fn persist(&self, id: &str, data: &str) -> Result<(), JournalError> {
        self.records()
            .entry(id.to_string())
            .or_default()
            .push(LogRecord {
                timestamp: Utc::now().to_rfc3339(),
                id: id.to_string(),
                data: data.to_string(),
            });
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<String>, JournalError> {
        Ok(self
            .records()
            .get(id)
            .and_then(|records| records.last())
            .map(|record| record.data.clone()))
    }

    fn shutdown(&self) -> Result<(), JournalError> {
        Ok(())
    }
}
