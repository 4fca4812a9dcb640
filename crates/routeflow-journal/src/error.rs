use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("failed to open journal at '{path}'")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to append to journal at '{path}'")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read journal at '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record in journal at '{path}'")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode journal record")]
    Encode(#[source] serde_json::Error),

    #[error("failed to flush journal")]
    Flush(#[source] std::io::Error),

    #[error("journal is shut down")]
    Closed,
}
