//! Bounded polling for report files written by another task or process

use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;

use crate::common::config::Timeouts;

/// How long and how often to poll, and what counts as "written"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub timeout: Duration,
    pub interval: Duration,
    /// Files smaller than this are treated as still being written
    pub min_size: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            interval: Duration::from_millis(300),
            min_size: 20,
        }
    }
}

impl From<&Timeouts> for PollSettings {
    fn from(timeouts: &Timeouts) -> Self {
        Self {
            timeout: timeouts.report_wait(),
            interval: timeouts.report_poll(),
            min_size: timeouts.report_min_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The file exists and reached the minimum size
    Ready,
    /// Gave up; the file may be missing or partial
    TimedOut,
}

impl PollOutcome {
    pub fn is_ready(self) -> bool {
        self == PollOutcome::Ready
    }
}

/// Wait until `path` exists with at least `min_size` bytes
///
/// Never fails: metadata errors count as "not yet", and running out of
/// time yields [`PollOutcome::TimedOut`].
pub async fn wait_for_file(path: &Path, settings: &PollSettings) -> PollOutcome {
    let start = Instant::now();
    loop {
        if let Ok(meta) = tokio::fs::metadata(path).await {
            if meta.is_file() && meta.len() >= settings.min_size {
                return PollOutcome::Ready;
            }
        }
        if start.elapsed() >= settings.timeout {
            tracing::debug!(path = %path.display(), "Timed out waiting for file");
            return PollOutcome::TimedOut;
        }
        tokio::time::sleep(settings.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> PollSettings {
        PollSettings {
            timeout: Duration::from_millis(200),
            interval: Duration::from_millis(20),
            min_size: 20,
        }
    }

    #[tokio::test]
    async fn test_ready_when_large_enough() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("report.json");
        std::fs::write(&file, "[{\"elements\":[],\"name\":\"x\"}]").unwrap();

        assert_eq!(wait_for_file(&file, &quick()).await, PollOutcome::Ready);
    }

    #[tokio::test]
    async fn test_times_out_on_small_or_missing_file() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("report.json");
        assert_eq!(wait_for_file(&file, &quick()).await, PollOutcome::TimedOut);

        std::fs::write(&file, "[]").unwrap();
        assert_eq!(wait_for_file(&file, &quick()).await, PollOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_picks_up_file_written_later() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("report.json");
        let writer_path = file.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tokio::fs::write(writer_path, vec![b' '; 64]).await.unwrap();
        });

        let settings = PollSettings {
            timeout: Duration::from_secs(5),
            ..quick()
        };
        assert!(wait_for_file(&file, &settings).await.is_ready());
    }

    #[test]
    fn test_settings_from_timeouts() {
        let settings = PollSettings::from(&Timeouts::default());
        assert_eq!(settings.timeout, Duration::from_secs(20));
        assert_eq!(settings.interval, Duration::from_millis(300));
        assert_eq!(settings.min_size, 20);
    }
}
