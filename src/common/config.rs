//! Configuration file handling
//!
//! A single TOML file carries the harness settings plus one table per
//! target environment:
//!
//! ```toml
//! [harness]
//! reports_dir = "/tmp/Reports"
//!
//! [environments.dev]
//! base_url = "https://api.dev.example.com"
//! auth_url = "https://auth.dev.example.com"
//! ```
//!
//! Environment tables are loaded once per name and cached; a handful of
//! environment variables override individual fields at load time.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths;
use super::{Error, Result};

/// Environment used when neither `--env` nor `ENVIRONMENT` is given
pub const DEFAULT_ENVIRONMENT: &str = "dev";

/// Environment variables that override environment fields, read at load
const OVERRIDE_VARS: &[(&str, &str)] = &[
    ("BASE_URL", "base_url"),
    ("AUTH_URL", "auth_url"),
    ("CLIENT_ID", "client_id"),
    ("CLIENT_SECRET", "client_secret"),
    ("RESOURCE_URL", "resource_url"),
    ("AUTH_EMAIL", "email"),
];

/// Top-level layout of the configuration file
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Harness-wide settings
    #[serde(default)]
    pub harness: HarnessSettings,

    /// Per-environment API settings, keyed by environment name
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

/// Settings for the runner and the report pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessSettings {
    /// Root folder for per-run report directories
    #[serde(default)]
    pub reports_dir: Option<PathBuf>,

    /// Scratch folder the BDD runner writes its raw reports into
    #[serde(default = "default_current_report_dir")]
    pub current_report_dir: PathBuf,

    /// Folder containing `.feature` files
    #[serde(default = "default_features_dir")]
    pub features_dir: PathBuf,

    /// Plain-text log captured into the generated index
    #[serde(default = "default_log_file")]
    pub log_file: Option<PathBuf>,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            reports_dir: None,
            current_report_dir: default_current_report_dir(),
            features_dir: default_features_dir(),
            log_file: default_log_file(),
            timeouts: Timeouts::default(),
        }
    }
}

impl HarnessSettings {
    /// Resolved reports root (`REPORTS_DIR` wins over the file)
    pub fn reports_root(&self) -> PathBuf {
        paths::reports_root(self.reports_dir.as_deref())
    }
}

fn default_current_report_dir() -> PathBuf {
    PathBuf::from(paths::CURRENT_REPORT_DIR)
}

fn default_features_dir() -> PathBuf {
    PathBuf::from("features")
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("test.log"))
}

/// Timeout settings in milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct Timeouts {
    /// Default timeout for a single HTTP request
    #[serde(default = "default_http_request")]
    pub http_request_ms: u64,

    /// How long to wait for the runner's JSON report to appear
    #[serde(default = "default_report_wait")]
    pub report_wait_ms: u64,

    /// Poll interval while waiting for the JSON report
    #[serde(default = "default_report_poll")]
    pub report_poll_ms: u64,

    /// Size below which a report file is treated as still being written
    #[serde(default = "default_report_min_bytes")]
    pub report_min_bytes: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            http_request_ms: default_http_request(),
            report_wait_ms: default_report_wait(),
            report_poll_ms: default_report_poll(),
            report_min_bytes: default_report_min_bytes(),
        }
    }
}

fn default_http_request() -> u64 {
    5_000
}
fn default_report_wait() -> u64 {
    20_000
}
fn default_report_poll() -> u64 {
    300
}
fn default_report_min_bytes() -> u64 {
    20
}

impl Timeouts {
    pub fn http_request(&self) -> Duration {
        Duration::from_millis(self.http_request_ms)
    }

    pub fn report_wait(&self) -> Duration {
        Duration::from_millis(self.report_wait_ms)
    }

    pub fn report_poll(&self) -> Duration {
        Duration::from_millis(self.report_poll_ms)
    }
}

/// Username/password pair used for token authentication
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// API settings for one target environment
///
/// Keys not known here are kept in `extra` and reachable through
/// [`EnvironmentConfig::value`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Base URL for API requests
    #[serde(default, alias = "baseURL", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Authentication endpoint
    #[serde(default, alias = "authURL", skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,

    /// OAuth-style client id
    #[serde(default, alias = "clientId", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// OAuth-style client secret
    #[serde(default, alias = "clientSecret", skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Resource identifier of the API under test
    #[serde(default, alias = "resourceURL", skip_serializing_if = "Option::is_none")]
    pub resource_url: Option<String>,

    /// E-mail used for e-mail JWT authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Default endpoint path for the e-mail auth service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_path: Option<String>,

    /// Per-environment HTTP timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Skip TLS certificate verification (internal environments only)
    #[serde(default)]
    pub allow_insecure_tls: bool,

    /// Default user for token authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,

    /// Any additional keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EnvironmentConfig {
    /// Apply variable overrides; `lookup` is `std::env::var` in production
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for &(var, field) in OVERRIDE_VARS {
            let Some(value) = lookup(var).filter(|v| !v.is_empty()) else {
                continue;
            };
            let slot = match field {
                "base_url" => &mut self.base_url,
                "auth_url" => &mut self.auth_url,
                "client_id" => &mut self.client_id,
                "client_secret" => &mut self.client_secret,
                "resource_url" => &mut self.resource_url,
                "email" => &mut self.email,
                _ => continue,
            };
            *slot = Some(value);
        }

        if let Some(flag) = lookup("ALLOW_INSECURE_TLS") {
            self.allow_insecure_tls = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// HTTP timeout for this environment, or `fallback`
    pub fn timeout(&self, fallback: Duration) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(fallback)
    }

    /// Base URL, or a configuration error naming the environment key
    pub fn require_base_url(&self) -> Result<&str> {
        self.base_url
            .as_deref()
            .ok_or_else(|| Error::Config("base_url is not configured".to_string()))
    }

    /// Whether client-credential token auth can be set up
    pub fn has_client_credentials(&self) -> bool {
        self.auth_url.is_some() && self.client_id.is_some() && self.client_secret.is_some()
    }

    /// Look up a dotted key such as `endpoints.education`
    pub fn value(&self, key: &str) -> Option<Value> {
        let root = serde_json::to_value(self).ok()?;
        key.split('.')
            .try_fold(&root, |node, part| node.get(part))
            .filter(|v| !v.is_null())
            .cloned()
    }

    /// Override a dotted key at runtime, creating intermediate tables
    pub fn set_value(&mut self, key: &str, value: Value) -> Result<()> {
        let mut root = serde_json::to_value(&*self)?;
        let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
        let Some((last, parents)) = parts.split_last() else {
            return Err(Error::Config("Empty configuration key".to_string()));
        };

        let mut node = &mut root;
        for part in parents {
            let object = node
                .as_object_mut()
                .ok_or_else(|| Error::Config(format!("'{key}' crosses a non-table value")))?;
            node = object
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
        }

        let object = node
            .as_object_mut()
            .ok_or_else(|| Error::Config(format!("'{key}' crosses a non-table value")))?;
        object.insert(last.to_string(), value);

        *self = serde_json::from_value(root)
            .map_err(|e| Error::Config(format!("Invalid value for '{key}': {e}")))?;
        Ok(())
    }
}

/// Loads the configuration file on first use and caches environments
#[derive(Debug, Default)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    file: Option<ConfigFile>,
    cache: HashMap<String, EnvironmentConfig>,
}

impl ConfigStore {
    /// Store backed by a specific file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Locate the configuration file
    ///
    /// Order: explicit path, `API_HARNESS_CONFIG`, `./config/environments.toml`,
    /// then the platform config directory.
    pub fn discover(explicit: Option<&Path>) -> Self {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("API_HARNESS_CONFIG").map(PathBuf::from))
            .or_else(|| Some(paths::local_config_path()).filter(|p| p.exists()))
            .or_else(paths::config_path);

        Self {
            path,
            ..Self::default()
        }
    }

    /// Store over already-loaded TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| Error::ConfigParse(e.to_string()))?;
        Ok(Self {
            path: None,
            file: Some(file),
            cache: HashMap::new(),
        })
    }

    /// Path this store reads from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn file(&mut self) -> Result<&ConfigFile> {
        if self.file.is_none() {
            let parsed = match &self.path {
                Some(path) if path.exists() => {
                    let content = std::fs::read_to_string(path).map_err(|e| {
                        Error::Config(format!("Failed to read '{}': {}", path.display(), e))
                    })?;
                    toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))?
                }
                _ => ConfigFile::default(),
            };
            self.file = Some(parsed);
        }
        Ok(self.file.get_or_insert_with(ConfigFile::default))
    }

    /// Harness settings (defaults when no file exists)
    pub fn harness(&mut self) -> Result<HarnessSettings> {
        Ok(self.file()?.harness.clone())
    }

    /// Load an environment, applying process environment overrides once
    pub fn load(&mut self, environment: &str) -> Result<&EnvironmentConfig> {
        self.load_with(environment, |var| std::env::var(var).ok())
    }

    /// Load an environment with a custom override lookup
    pub fn load_with<F>(&mut self, environment: &str, lookup: F) -> Result<&EnvironmentConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        if !self.cache.contains_key(environment) {
            let mut config = self
                .file()?
                .environments
                .get(environment)
                .cloned()
                .ok_or_else(|| Error::EnvironmentNotFound(environment.to_string()))?;
            config.apply_overrides(lookup);
            tracing::debug!(environment, "Loaded environment configuration");
            self.cache.insert(environment.to_string(), config);
        }
        Ok(&self.cache[environment])
    }

    /// Dotted lookup within an environment
    pub fn value(&mut self, environment: &str, key: &str) -> Result<Option<Value>> {
        Ok(self.load(environment)?.value(key))
    }

    /// Override a value for the rest of the process lifetime
    pub fn set_value(&mut self, environment: &str, key: &str, value: Value) -> Result<()> {
        self.load(environment)?;
        match self.cache.get_mut(environment) {
            Some(config) => config.set_value(key, value),
            None => Err(Error::EnvironmentNotFound(environment.to_string())),
        }
    }

    /// Drop cached environments so the next load re-reads overrides
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

/// Resolve the environment name: explicit, then `ENVIRONMENT`, then `dev`
pub fn environment_name(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var("ENVIRONMENT").ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[harness]
reports_dir = "/var/reports"

[harness.timeouts]
report_wait_ms = 1000

[environments.dev]
baseURL = "https://api.dev.example.com"
auth_url = "https://auth.dev.example.com"
client_id = "harness"
client_secret = "s3cret"
timeout_ms = 10000

[environments.dev.credentials]
username = "qa"
password = "pw"

[environments.dev.endpoints]
education = "/api/education"
"#;

    fn no_overrides(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_load_environment_with_aliases_and_extra_keys() {
        let mut store = ConfigStore::from_toml(SAMPLE).unwrap();
        let config = store.load_with("dev", no_overrides).unwrap();

        assert_eq!(config.base_url.as_deref(), Some("https://api.dev.example.com"));
        assert!(config.has_client_credentials());
        assert_eq!(config.timeout(Duration::from_secs(5)), Duration::from_secs(10));
        assert_eq!(config.credentials.as_ref().unwrap().username, "qa");
        assert_eq!(
            config.value("endpoints.education"),
            Some(Value::String("/api/education".to_string()))
        );
    }

    #[test]
    fn test_unknown_environment() {
        let mut store = ConfigStore::from_toml(SAMPLE).unwrap();
        let err = store.load_with("prod", no_overrides).unwrap_err();
        assert!(matches!(err, Error::EnvironmentNotFound(name) if name == "prod"));
    }

    #[test]
    fn test_overrides_applied_once_and_cached() {
        let mut store = ConfigStore::from_toml(SAMPLE).unwrap();
        let config = store
            .load_with("dev", |var| match var {
                "BASE_URL" => Some("http://localhost:8080".to_string()),
                "ALLOW_INSECURE_TLS" => Some("true".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:8080"));
        assert!(config.allow_insecure_tls);

        // Cached: a second load does not consult the lookup again
        let config = store
            .load_with("dev", |var| match var {
                "BASE_URL" => Some("http://elsewhere".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:8080"));
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let mut config = EnvironmentConfig {
            base_url: Some("https://kept".to_string()),
            ..Default::default()
        };
        config.apply_overrides(|var| (var == "BASE_URL").then(String::new));
        assert_eq!(config.base_url.as_deref(), Some("https://kept"));
    }

    #[test]
    fn test_set_value_creates_nested_tables() {
        let mut store = ConfigStore::from_toml(SAMPLE).unwrap();
        store.load_with("dev", no_overrides).unwrap();

        store
            .set_value("dev", "endpoints.orders", Value::String("/api/orders".into()))
            .unwrap();
        store
            .set_value("dev", "base_url", Value::String("https://override".into()))
            .unwrap();

        assert_eq!(
            store.value("dev", "endpoints.orders").unwrap(),
            Some(Value::String("/api/orders".to_string()))
        );
        assert_eq!(
            store.value("dev", "endpoints.education").unwrap(),
            Some(Value::String("/api/education".to_string()))
        );
        assert_eq!(
            store.load("dev").unwrap().base_url.as_deref(),
            Some("https://override")
        );
    }

    #[test]
    fn test_harness_settings_defaults() {
        let mut store = ConfigStore::from_toml(SAMPLE).unwrap();
        let harness = store.harness().unwrap();
        assert_eq!(harness.reports_dir, Some(PathBuf::from("/var/reports")));
        assert_eq!(harness.timeouts.report_wait_ms, 1000);
        assert_eq!(harness.timeouts.report_poll_ms, 300);
        assert_eq!(harness.timeouts.http_request_ms, 5000);
        assert_eq!(harness.current_report_dir, PathBuf::from("reports/current"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let mut store = ConfigStore::new("/nonexistent/api-harness/environments.toml");
        let harness = store.harness().unwrap();
        assert_eq!(harness.features_dir, PathBuf::from("features"));
        assert!(matches!(
            store.load_with("dev", no_overrides),
            Err(Error::EnvironmentNotFound(_))
        ));
    }
}
