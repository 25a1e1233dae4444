//! Post-run report relocation
//!
//! After the suite finishes, the runner's raw reports sit in the scratch
//! directory. The processor moves them into the most recent run directory,
//! writes the index and removes the scratch directory. Nothing here can
//! fail the run: every problem becomes a warning on the summary.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;

use super::index::write_index;
use super::tracker::{HTML_REPORT_FILE, JSON_REPORT_FILE};
use super::wait::{wait_for_file, PollSettings};

/// What a processing pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessSummary {
    /// Run directory that received the reports
    pub run_dir: Option<PathBuf>,
    /// Files copied into the run directory
    pub copied: Vec<PathBuf>,
    pub index: Option<PathBuf>,
    /// Whether the JSON report was complete when copied (`None` if absent)
    pub json_ready: Option<bool>,
    pub warnings: Vec<String>,
    /// Nothing to process
    pub skipped: bool,
}

impl ProcessSummary {
    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    fn skip(mut self, reason: &str) -> Self {
        tracing::info!("{}", reason);
        self.skipped = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ReportProcessor {
    current_dir: PathBuf,
    reports_root: PathBuf,
    poll: PollSettings,
    log_file: Option<PathBuf>,
}

impl ReportProcessor {
    pub fn new(current_dir: impl Into<PathBuf>, reports_root: impl Into<PathBuf>) -> Self {
        Self {
            current_dir: current_dir.into(),
            reports_root: reports_root.into(),
            poll: PollSettings {
                timeout: std::time::Duration::from_secs(20),
                ..PollSettings::default()
            },
            log_file: None,
        }
    }

    pub fn with_poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Log file whose contents are embedded in the index
    pub fn with_log_file(mut self, log_file: Option<PathBuf>) -> Self {
        self.log_file = log_file;
        self
    }

    /// Run one processing pass
    pub async fn process(&self) -> ProcessSummary {
        tracing::info!("Starting report processing");
        let summary = ProcessSummary::default();

        if !self.current_dir.is_dir() {
            return summary.skip("No current reports found. Skipping.");
        }

        let html = self.current_dir.join(HTML_REPORT_FILE);
        let json = self.current_dir.join(JSON_REPORT_FILE);
        if !html.exists() && !json.exists() {
            return summary.skip("No report files found.");
        }

        self.relocate(summary, &html, &json).await
    }

    async fn relocate(&self, mut summary: ProcessSummary, html: &Path, json: &Path) -> ProcessSummary {
        if let Err(e) = tokio::fs::create_dir_all(&self.reports_root).await {
            summary.warn(format!(
                "Failed to create reports root {}: {}",
                self.reports_root.display(),
                e
            ));
            return summary;
        }

        let run_dir = match self.latest_run_dir().await {
            Some(dir) => {
                tracing::info!("Latest test run directory: {}", dir.display());
                dir
            }
            None => {
                let stamp = Utc::now().to_rfc3339().replace([':', '.'], "-");
                let dir = self.reports_root.join(format!("manual_run_{}", stamp));
                if let Err(e) = tokio::fs::create_dir_all(&dir).await {
                    summary.warn(format!("Failed to create fallback test-run directory: {}", e));
                    return summary;
                }
                tracing::info!("Created fallback test-run directory: {}", dir.display());
                dir
            }
        };
        summary.run_dir = Some(run_dir.clone());

        if html.exists() {
            self.copy(&mut summary, html, &run_dir.join(HTML_REPORT_FILE)).await;
        }

        if json.exists() {
            let ready = wait_for_file(json, &self.poll).await.is_ready();
            summary.json_ready = Some(ready);
            let dest = run_dir.join(JSON_REPORT_FILE);
            if self.copy(&mut summary, json, &dest).await && !ready {
                summary.warn(
                    "JSON report may have been incomplete when copied (timed out waiting)".to_string(),
                );
            }
        }

        let log = self.read_log().await;
        match write_index(&run_dir, log.as_deref()) {
            Ok(index) => summary.index = Some(index),
            Err(e) => summary.warn(format!("Failed to generate index.html: {}", e)),
        }

        match tokio::fs::remove_dir_all(&self.current_dir).await {
            Ok(()) => tracing::info!("Cleaned up temporary report directory"),
            Err(e) => summary.warn(format!(
                "Failed to clean up temporary report directory: {}",
                e
            )),
        }

        tracing::info!("Report processing completed");
        summary
    }

    async fn copy(&self, summary: &mut ProcessSummary, from: &Path, to: &Path) -> bool {
        match tokio::fs::copy(from, to).await {
            Ok(size) => {
                tracing::info!("Report saved: {} (size: {})", to.display(), size);
                summary.copied.push(to.to_path_buf());
                true
            }
            Err(e) => {
                summary.warn(format!("Failed to copy {}: {}", from.display(), e));
                false
            }
        }
    }

    /// Most recently modified directory under the root, other than `current`
    /// and the scratch directory itself
    async fn latest_run_dir(&self) -> Option<PathBuf> {
        let mut entries = tokio::fs::read_dir(&self.reports_root).await.ok()?;
        let scratch = tokio::fs::canonicalize(&self.current_dir).await.ok();
        let mut latest: Option<(SystemTime, PathBuf)> = None;

        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name() == "current" {
                continue;
            }
            if scratch.is_some() && tokio::fs::canonicalize(entry.path()).await.ok() == scratch {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_dir() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if latest.as_ref().map_or(true, |(t, _)| modified > *t) {
                latest = Some((modified, entry.path()));
            }
        }

        latest.map(|(_, path)| path)
    }

    async fn read_log(&self) -> Option<String> {
        let path = self.log_file.as_ref()?;
        match tokio::fs::read(path).await {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                tracing::debug!("No log output to embed from {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quick_poll() -> PollSettings {
        PollSettings {
            timeout: Duration::from_millis(100),
            interval: Duration::from_millis(10),
            min_size: 20,
        }
    }

    #[tokio::test]
    async fn test_missing_current_dir_is_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let processor = ReportProcessor::new(temp.path().join("current"), temp.path().join("Reports"));
        let summary = processor.process().await;
        assert!(summary.skipped);
        assert!(summary.warnings.is_empty());
        assert!(!temp.path().join("Reports").exists());
    }

    #[tokio::test]
    async fn test_empty_current_dir_is_skipped_and_kept() {
        let temp = tempfile::tempdir().unwrap();
        let current = temp.path().join("current");
        std::fs::create_dir(&current).unwrap();
        let summary = ReportProcessor::new(&current, temp.path().join("Reports"))
            .process()
            .await;
        assert!(summary.skipped);
        assert!(current.exists());
    }

    #[tokio::test]
    async fn test_fallback_manual_run_dir() {
        let temp = tempfile::tempdir().unwrap();
        let current = temp.path().join("current");
        let root = temp.path().join("Reports");
        std::fs::create_dir(&current).unwrap();
        std::fs::write(current.join(HTML_REPORT_FILE), "<html></html>").unwrap();
        // Too small to count as complete
        std::fs::write(current.join(JSON_REPORT_FILE), "[]").unwrap();

        let summary = ReportProcessor::new(&current, &root)
            .with_poll(quick_poll())
            .process()
            .await;

        let run_dir = summary.run_dir.clone().unwrap();
        assert!(run_dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("manual_run_"));
        assert_eq!(summary.copied.len(), 2);
        assert_eq!(summary.json_ready, Some(false));
        assert_eq!(summary.warnings.len(), 1);
        assert!(run_dir.join("index.html").is_file());
        assert!(!current.exists());
    }

    #[tokio::test]
    async fn test_ignores_directory_named_current() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("Reports");
        let scratch = temp.path().join("scratch");
        std::fs::create_dir_all(root.join("current")).unwrap();
        std::fs::create_dir(root.join("Run_A")).unwrap();
        std::fs::create_dir(&scratch).unwrap();
        std::fs::write(scratch.join(HTML_REPORT_FILE), "<html></html>").unwrap();

        let summary = ReportProcessor::new(&scratch, &root)
            .with_log_file(Some(temp.path().join("missing.log")))
            .process()
            .await;
        assert_eq!(summary.run_dir, Some(root.join("Run_A")));
        assert_eq!(summary.json_ready, None);
        assert!(summary.warnings.is_empty());
    }

    fn write_report(dir: &Path) {
        std::fs::write(dir.join(JSON_REPORT_FILE), "[{\"elements\":[],\"name\":\"Education\"}]").unwrap();
    }

    #[tokio::test]
    async fn test_scratch_inside_root_is_not_a_run() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("Reports");
        let raw = root.join("raw");
        std::fs::create_dir_all(root.join("Run_A")).unwrap();
        std::fs::create_dir(&raw).unwrap();
        write_report(&raw);

        let summary = ReportProcessor::new(&raw, &root)
            .with_poll(quick_poll())
            .process()
            .await;

        assert_eq!(summary.run_dir, Some(root.join("Run_A")));
        assert_eq!(summary.json_ready, Some(true));
        assert!(summary.warnings.is_empty());
        assert!(root.join("Run_A").join(JSON_REPORT_FILE).is_file());
        assert!(!raw.exists());
    }

    #[tokio::test]
    async fn test_lone_scratch_inside_root_gets_fallback_run() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("Reports");
        let raw = root.join("raw");
        std::fs::create_dir_all(&raw).unwrap();
        write_report(&raw);

        let summary = ReportProcessor::new(&raw, &root)
            .with_poll(quick_poll())
            .process()
            .await;

        let run_dir = summary.run_dir.clone().unwrap();
        assert_ne!(run_dir, raw);
        assert!(run_dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("manual_run_"));
        assert!(run_dir.join(JSON_REPORT_FILE).is_file());
        assert!(summary.warnings.is_empty());
    }
}
