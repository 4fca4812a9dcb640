use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::caretaker::{Caretaker, LogRecord};
use crate::error::JournalError;

/// File-backed caretaker: one append-only `<dir>/<id>.log` per workflow id.
///
/// Write handles are opened on first use and kept until shutdown. `get`
/// opens a fresh read handle and scans from the head; the latest record for
/// the id wins.
pub struct FileCaretaker {
    dir: PathBuf,
    handles: Mutex<HashMap<String, File>>,
    closed: AtomicBool,
}

impl FileCaretaker {
    /// # Errors
    ///
    /// Returns an error if the journal directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| JournalError::Open {
            path: dir.clone(),
            source,
        })?;

        Ok(Self {
            dir,
            handles: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    fn log_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.log"))
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<String, File>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Caretaker for FileCaretaker {
    fn persist(&self, id: &str, data: &str) -> Result<(), JournalError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(JournalError::Closed);
        }

        let record = LogRecord {
            timestamp: Utc::now().to_rfc3339(),
            id: id.to_string(),
            data: data.to_string(),
        };
        let line = serde_json::to_string(&record).map_err(JournalError::Encode)?;

        let path = self.log_path(id);
        let mut handles = self.handles();
        let file = match handles.entry(id.to_string()) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                let file = OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&path)
                    .map_err(|source| JournalError::Open {
                        path: path.clone(),
                        source,
                    })?;
                vacant.insert(file)
            }
        };

        writeln!(file, "{line}").map_err(|source| JournalError::Append { path, source })
    }

    fn get(&self, id: &str) -> Result<Option<String>, JournalError> {
        let path = self.log_path(id);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(JournalError::Open { path, source }),
        };

        let mut latest = None;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| JournalError::Read {
                path: path.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let record: LogRecord =
                serde_json::from_str(&line).map_err(|source| JournalError::Decode {
                    path: path.clone(),
                    source,
                })?;
            if record.id == id {
                latest = Some(record.data);
            }
        }

        Ok(latest)
    }

    fn shutdown(&self) -> Result<(), JournalError> {
        self.closed.store(true, Ordering::SeqCst);

        let mut handles = self.handles();
        for (_, file) in handles.drain() {
            file.sync_all().map_err(JournalError::Flush)?;
        }

        Ok(())
    }
}
