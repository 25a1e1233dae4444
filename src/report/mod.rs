//! Run directories, metadata and HTML summaries
//!
//! [`ReportTracker`] owns the per-scenario directory lifecycle while a suite
//! runs; [`ReportProcessor`] moves the runner's raw output into place
//! afterwards.

pub mod cucumber_json;
pub mod index;
pub mod metadata;
pub mod processor;
pub mod tracker;
pub mod wait;

pub use metadata::{MetadataUpdate, RunStatus, RunSummary, TestRunRecord};
pub use processor::{ProcessSummary, ReportProcessor};
pub use tracker::{list_runs, sanitize_scenario_name, ReportTracker};
pub use wait::{wait_for_file, PollOutcome, PollSettings};
