//! Per-run metadata persisted as `metadata.json`

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

pub const METADATA_FILE: &str = "metadata.json";

/// Outcome of a scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Passed,
    Failed,
    #[default]
    Unknown,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Passed => "PASSED",
            RunStatus::Failed => "FAILED",
            RunStatus::Unknown => "UNKNOWN",
        })
    }
}

/// Contents of `metadata.json`
///
/// Every field has a default so hand-edited or partial files still load;
/// a missing `startTime` reads as the epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunRecord {
    #[serde(default)]
    pub scenario_name: String,
    #[serde(default)]
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: DateTime<Utc>,
    /// Milliseconds between start and end
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

impl TestRunRecord {
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::filesystem(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| Error::filesystem(path, e))
    }
}

/// Fields the caller supplies when a run finishes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataUpdate {
    pub status: Option<RunStatus>,
    pub steps: Option<usize>,
    pub failure_message: Option<String>,
}

impl MetadataUpdate {
    pub fn status(mut self, status: RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn steps(mut self, steps: usize) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }
}

/// One entry of the run listing
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Directory name
    pub name: String,
    pub path: PathBuf,
    /// `None` when the directory has no readable metadata
    pub metadata: Option<TestRunRecord>,
}

impl RunSummary {
    /// Start time used for ordering; epoch when unknown
    pub fn start_time(&self) -> DateTime<Utc> {
        self.metadata
            .as_ref()
            .map(|m| m.start_time)
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    pub fn status(&self) -> RunStatus {
        self.metadata.as_ref().map(|m| m.status).unwrap_or_default()
    }
}
