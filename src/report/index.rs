//! `index.html` summary for a run directory

use std::path::{Path, PathBuf};

use askama::Template;
use chrono::{Local, Utc};

use super::cucumber_json::{read_report, scenario_steps, Step, StepStats};
use super::metadata::{RunStatus, TestRunRecord, METADATA_FILE};
use super::tracker::{INDEX_FILE, JSON_REPORT_FILE};
use crate::common::{Error, Result};

struct StepRow {
    number: usize,
    text: String,
    status: String,
    class: &'static str,
    icon: &'static str,
    duration: String,
    error: Option<String>,
}

impl StepRow {
    fn new(number: usize, step: &Step) -> Self {
        let status = step.status();
        let (class, icon) = match status {
            "passed" => ("passed", "✓"),
            "failed" => ("failed", "✗"),
            _ => ("skipped", "⊘"),
        };
        Self {
            number,
            text: step.text(),
            status: status.to_uppercase(),
            class,
            icon,
            duration: step
                .duration_ms()
                .map(|ms| format!("{:.2}ms", ms))
                .unwrap_or_else(|| "N/A".to_string()),
            error: step.error_message().map(str::to_string),
        }
    }
}

#[derive(Template)]
#[template(path = "run_index.html")]
struct RunIndexTemplate<'a> {
    scenario_name: &'a str,
    passed: bool,
    stats: StepStats,
    start_time: String,
    duration: String,
    environment: &'a str,
    run_id: &'a str,
    steps: Vec<StepRow>,
    log: Option<&'a str>,
    generated_at: String,
}

/// Overall result shown in the header
///
/// PASSED when the metadata says so or when no step failed.
pub fn overall_status(metadata: Option<&TestRunRecord>, stats: &StepStats) -> RunStatus {
    let recorded_pass = metadata.is_some_and(|m| m.status == RunStatus::Passed);
    if recorded_pass || stats.failed == 0 {
        RunStatus::Passed
    } else {
        RunStatus::Failed
    }
}

/// Render the index page for `run_id`
pub fn render_index(
    run_id: &str,
    metadata: Option<&TestRunRecord>,
    steps: &[Step],
    log: Option<&str>,
) -> Result<String> {
    let stats = StepStats::from_steps(steps);
    let scenario_name = metadata
        .map(|m| m.scenario_name.as_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(run_id);

    let template = RunIndexTemplate {
        scenario_name,
        passed: overall_status(metadata, &stats) == RunStatus::Passed,
        stats,
        start_time: metadata
            .map(|m| {
                m.start_time
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| "N/A".to_string()),
        duration: metadata
            .filter(|m| m.duration > 0)
            .map(|m| format!("{}ms", m.duration))
            .unwrap_or_else(|| "N/A".to_string()),
        environment: metadata
            .map(|m| m.environment.as_str())
            .filter(|e| !e.is_empty())
            .unwrap_or("dev"),
        run_id,
        steps: steps
            .iter()
            .enumerate()
            .map(|(i, step)| StepRow::new(i + 1, step))
            .collect(),
        log: log.filter(|l| !l.trim().is_empty()),
        generated_at: Utc::now()
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
    };
    Ok(template.render()?)
}

/// Build `index.html` in `run_dir` from its metadata and JSON report
///
/// Missing or unreadable inputs are logged and rendered as "no data";
/// only a failure to write the index itself is an error.
pub fn write_index(run_dir: &Path, log: Option<&str>) -> Result<PathBuf> {
    let run_id = run_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let metadata_path = run_dir.join(METADATA_FILE);
    let metadata = if metadata_path.is_file() {
        TestRunRecord::read(&metadata_path)
            .map_err(|e| tracing::warn!("Error reading metadata: {}", e))
            .ok()
    } else {
        None
    };

    let report_path = run_dir.join(JSON_REPORT_FILE);
    let features = if report_path.is_file() {
        read_report(&report_path)
            .map_err(|e| tracing::warn!("Failed to parse report.json for index generation: {}", e))
            .unwrap_or_default()
    } else {
        Vec::new()
    };
    let scenario = metadata.as_ref().map(|m| m.scenario_name.as_str());
    let steps = scenario_steps(&features, scenario);

    let html = render_index(&run_id, metadata.as_ref(), steps, log)?;
    let index_path = run_dir.join(INDEX_FILE);
    std::fs::write(&index_path, html).map_err(|e| Error::filesystem(&index_path, e))?;
    tracing::info!("Test report index created: {}", index_path.display());
    Ok(index_path)
}
