//! Cross-platform report and configuration paths
//!
//! Windows: reports go to `C:\Reports`
//! Unix/macOS: reports go to `/tmp/Reports`

use std::path::{Path, PathBuf};

use super::{Error, Result};

/// Name used for platform config directories
const APP_NAME: &str = "api-harness";

/// Scratch directory the BDD runner writes raw reports into
pub const CURRENT_REPORT_DIR: &str = "reports/current";

/// Default root for per-run report directories
#[cfg(windows)]
pub fn default_reports_root() -> PathBuf {
    PathBuf::from(r"C:\Reports")
}

#[cfg(not(windows))]
pub fn default_reports_root() -> PathBuf {
    PathBuf::from("/tmp/Reports")
}

/// Resolve the reports root
///
/// `REPORTS_DIR` wins, then the configured directory, then the platform default.
pub fn reports_root(configured: Option<&Path>) -> PathBuf {
    std::env::var_os("REPORTS_DIR")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| configured.map(Path::to_path_buf))
        .unwrap_or_else(default_reports_root)
}

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/api-harness/`
/// - macOS: `~/Library/Application Support/api-harness/`
/// - Windows: `%APPDATA%\api-harness\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file in the platform config directory
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("environments.toml"))
}

/// Project-local configuration file, checked before the platform one
pub fn local_config_path() -> PathBuf {
    PathBuf::from("config").join("environments.toml")
}

/// Create a directory (and parents) if missing
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| Error::filesystem(path, e))?;
        tracing::info!("Created directory: {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reports_root_is_absolute() {
        assert!(default_reports_root().is_absolute());
    }

    #[test]
    fn test_configured_reports_root_used_without_env() {
        if std::env::var_os("REPORTS_DIR").is_some() {
            return;
        }
        let root = reports_root(Some(Path::new("/srv/reports")));
        assert_eq!(root, PathBuf::from("/srv/reports"));
    }

    #[test]
    fn test_ensure_dir_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let nested = temp.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
