//! Per-scenario run directories
//!
//! Layout under the reports root:
//!
//! ```text
//! <root>/<Sanitized_Scenario_Name>_<YYYY-MM-DD_HH-mm-ss>[_N]/
//!     metadata.json
//!     report.json
//!     report.html
//!     index.html
//! ```

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};

use super::index::write_index;
use super::metadata::{MetadataUpdate, RunSummary, TestRunRecord, METADATA_FILE};
use super::wait::{wait_for_file, PollOutcome, PollSettings};
use crate::common::{system_clock, Clock, Error, Result};

pub const HTML_REPORT_FILE: &str = "report.html";
pub const JSON_REPORT_FILE: &str = "report.json";
pub const INDEX_FILE: &str = "index.html";

const MAX_NAME_LEN: usize = 50;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const MAX_SUFFIX: u32 = 1000;

/// Make a scenario name safe for a directory name
///
/// Drops everything except ASCII alphanumerics, whitespace and `-`, turns
/// each whitespace run into one `_`, and keeps at most 50 characters.
pub fn sanitize_scenario_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_space = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else if c.is_ascii_alphanumeric() || c == '-' {
            out.push(c);
            in_space = false;
        }
    }
    out.truncate(MAX_NAME_LEN);
    out
}

/// Second-resolution local timestamp used in directory names
pub fn run_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}

/// List every run directory under `root`, newest first
///
/// Runs without readable metadata sort last. A missing root is an empty
/// listing.
pub fn list_runs(root: &Path) -> Result<Vec<RunSummary>> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::filesystem(root, e)),
    };

    let mut runs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::filesystem(root, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let metadata_path = path.join(METADATA_FILE);
        let metadata = if metadata_path.is_file() {
            match TestRunRecord::read(&metadata_path) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Failed to read metadata from {}: {}", metadata_path.display(), e);
                    None
                }
            }
        } else {
            None
        };

        runs.push(RunSummary {
            name: entry.file_name().to_string_lossy().into_owned(),
            path,
            metadata,
        });
    }

    runs.sort_by(|a, b| {
        b.start_time()
            .cmp(&a.start_time())
            .then_with(|| b.name.cmp(&a.name))
    });
    Ok(runs)
}

#[derive(Debug, Clone)]
struct ActiveRun {
    dir: PathBuf,
    scenario_name: String,
    started_at: DateTime<Utc>,
}

/// Allocates run directories and records their metadata
pub struct ReportTracker {
    root: PathBuf,
    environment: String,
    current: Option<ActiveRun>,
    clock: Clock,
}

impl std::fmt::Debug for ReportTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportTracker")
            .field("root", &self.root)
            .field("environment", &self.environment)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl ReportTracker {
    pub fn new(root: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            environment: environment.into(),
            current: None,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Create a fresh directory for `scenario_name` and make it current
    ///
    /// A directory that already exists for the same second gets `_2`, `_3`,
    /// and so on appended.
    pub fn initialize_test_run(&mut self, scenario_name: &str) -> Result<PathBuf> {
        // A failed init must not leave the previous run current
        self.current = None;
        std::fs::create_dir_all(&self.root).map_err(|e| Error::filesystem(&self.root, e))?;

        let started_at = (self.clock)();
        let mut base = sanitize_scenario_name(scenario_name);
        if base.is_empty() {
            base.push_str("scenario");
        }
        let base = format!("{}_{}", base, run_timestamp(started_at));

        let dir = self.claim_dir(&base)?;
        tracing::info!("Test run directory created: {}", dir.display());

        self.current = Some(ActiveRun {
            dir: dir.clone(),
            scenario_name: scenario_name.to_string(),
            started_at,
        });
        Ok(dir)
    }

    fn claim_dir(&self, base: &str) -> Result<PathBuf> {
        for n in 1..=MAX_SUFFIX {
            let name = if n == 1 {
                base.to_string()
            } else {
                format!("{}_{}", base, n)
            };
            let dir = self.root.join(name);
            match std::fs::create_dir(&dir) {
                Ok(()) => return Ok(dir),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(Error::filesystem(&dir, e)),
            }
        }
        Err(Error::Internal(format!(
            "Could not allocate a run directory for '{}'",
            base
        )))
    }

    pub fn current_run_dir(&self) -> Option<&Path> {
        self.current.as_ref().map(|run| run.dir.as_path())
    }

    pub fn current_scenario(&self) -> Option<&str> {
        self.current.as_ref().map(|run| run.scenario_name.as_str())
    }

    fn run_file(&self, file: &str) -> Result<PathBuf> {
        self.current_run_dir()
            .map(|dir| dir.join(file))
            .ok_or(Error::RunNotInitialized)
    }

    pub fn html_report_path(&self) -> Result<PathBuf> {
        self.run_file(HTML_REPORT_FILE)
    }

    pub fn json_report_path(&self) -> Result<PathBuf> {
        self.run_file(JSON_REPORT_FILE)
    }

    pub fn metadata_path(&self) -> Result<PathBuf> {
        self.run_file(METADATA_FILE)
    }

    pub fn index_path(&self) -> Result<PathBuf> {
        self.run_file(INDEX_FILE)
    }

    /// Finish the current run: merge `update` with timing and write metadata
    pub fn save_metadata(&self, update: MetadataUpdate) -> Result<TestRunRecord> {
        let run = self.current.as_ref().ok_or(Error::RunNotInitialized)?;
        let end_time = (self.clock)();

        let record = TestRunRecord {
            scenario_name: run.scenario_name.clone(),
            start_time: run.started_at,
            end_time,
            duration: (end_time - run.started_at).num_milliseconds(),
            environment: self.environment.clone(),
            status: update.status.unwrap_or_default(),
            steps: update.steps.unwrap_or_default(),
            failure_message: update.failure_message,
        };

        let path = run.dir.join(METADATA_FILE);
        record.write(&path)?;
        tracing::info!("Test metadata saved: {}", path.display());
        Ok(record)
    }

    pub fn all_test_runs(&self) -> Result<Vec<RunSummary>> {
        list_runs(&self.root)
    }

    /// Wait for the run's `report.json`, then write `index.html`
    ///
    /// The index is written even when the JSON report never shows up.
    pub async fn generate_index(&self, poll: &PollSettings, log: Option<&str>) -> Result<PathBuf> {
        let json = self.json_report_path()?;
        if wait_for_file(&json, poll).await == PollOutcome::TimedOut {
            tracing::warn!("JSON report not ready, generating index without it: {}", json.display());
        }
        let dir = self.current_run_dir().ok_or(Error::RunNotInitialized)?;
        write_index(dir, log)
    }
}
