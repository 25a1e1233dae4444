//! Logging and tracing configuration
//!
//! Console output is always on. Runs that produce reports also log to a
//! plain-text file so the report index can embed what happened.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Keeps the background log writer alive; drop it last
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    file: Option<WorkerGuard>,
}

impl LogGuard {
    /// Flush pending lines to the log file and stop file logging
    ///
    /// Console logging continues. Later events no longer reach the file.
    pub fn flush_file(&mut self) {
        drop(self.file.take());
    }
}

/// Build the filter directive for a `LOG_LEVEL`-style value
///
/// Unknown levels fall back to INFO. Dependencies stay at WARN.
pub fn filter_directive(level: Option<&str>) -> String {
    let level = level
        .map(|l| l.trim().to_ascii_lowercase())
        .filter(|l| LEVELS.contains(&l.as_str()))
        .unwrap_or_else(|| "info".to_string());
    format!("api_harness={level},warn")
}

/// Initialize tracing
///
/// `RUST_LOG` takes precedence over `level` (usually from `LOG_LEVEL`).
/// When `log_file` is given, a second, non-ANSI layer appends to it.
pub fn init(level: Option<&str>, log_file: Option<&Path>) -> LogGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));

    let console = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let mut guard = None;
    let file_layer = log_file.and_then(|path| {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path.file_name()?;
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Warning: Could not create log directory {}: {}", dir.display(), e);
            return None;
        }

        let appender = tracing_appender::rolling::never(dir, name);
        let (writer, worker) = tracing_appender::non_blocking(appender);
        guard = Some(worker);
        Some(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();

    LogGuard { file: guard }
}

/// Truncate a log file left over from a previous run
pub fn truncate_log(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        std::fs::write(path, "")?;
    }
    Ok(())
}
