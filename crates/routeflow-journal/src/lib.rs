//! Append-only snapshot persistence, keyed by workflow id.
//!
//! The caretaker never rewrites history: one timestamped record is appended
//! per step, and warm restart reads the latest record for an id by scanning
//! from the start. The scan cost is acceptable; recovery is rare and logs
//! are rotated on clean shutdown.

mod caretaker;
mod error;
mod file;
mod memory;

pub use caretaker::{Caretaker, LogRecord};
pub use error::JournalError;
pub use file::FileCaretaker;
pub use memory::MemoryCaretaker;
