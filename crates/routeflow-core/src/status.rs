use std::fmt;

use serde::{Deserialize, Serialize};

/// Progress of the walking engine, stored in the [`Context`](crate::Context)
/// under the reserved status entry so it survives snapshotting.
///
/// Progresses `InProgress` → (`Rollback`) → `Closed`, monotonically per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineStatus {
    Start,
    InProgress,
    Rollback,
    Closed,
}

impl MachineStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::InProgress => "IN_PROGRESS",
            Self::Rollback => "ROLLBACK",
            Self::Closed => "CLOSED",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "START" => Some(Self::Start),
            "IN_PROGRESS" => Some(Self::InProgress),
            "ROLLBACK" => Some(Self::Rollback),
            "CLOSED" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Unknown,
    Success,
    Fail,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "UNKNOWN",
            Self::Success => "SUCCESS",
            Self::Fail => "FAIL",
        };
        f.write_str(s)
    }
}
