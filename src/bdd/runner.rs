//! Suite runner: cucumber wiring, scenario hooks and the run outcome

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use cucumber::event::ScenarioFinished;
use cucumber::{gherkin, writer, World as _};
use futures_util::FutureExt;

use super::world::ApiWorld;
use api_harness::auth::TokenCache;
use api_harness::common::config::{EnvironmentConfig, Timeouts};
use api_harness::common::{paths, Error, Result};
use api_harness::http::{ApiClient, Transport};
use api_harness::report::tracker::JSON_REPORT_FILE;
use api_harness::report::{MetadataUpdate, ReportTracker, RunStatus};

/// Scenario counts for one suite run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuiteOutcome {
    pub passed: usize,
    pub failed: usize,
    /// Scenarios with a skipped (usually undefined) step
    pub skipped: usize,
}

impl SuiteOutcome {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    pub fn success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    pub fn record(&mut self, status: RunStatus) {
        match status {
            RunStatus::Passed => self.passed += 1,
            RunStatus::Failed => self.failed += 1,
            RunStatus::Unknown => self.skipped += 1,
        }
    }
}

/// Shared state handed to every scenario
pub struct SuiteContext {
    pub environment: String,
    pub config: EnvironmentConfig,
    pub transport: Arc<dyn Transport>,
    /// Present when the environment has client credentials
    pub tokens: Option<Arc<TokenCache>>,
    pub tracker: tokio::sync::Mutex<ReportTracker>,
    outcome: Mutex<SuiteOutcome>,
}

impl std::fmt::Debug for SuiteContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteContext")
            .field("environment", &self.environment)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl SuiteContext {
    /// Build the HTTP client and token cache for `config`
    pub fn new(
        environment: impl Into<String>,
        config: EnvironmentConfig,
        timeouts: &Timeouts,
        reports_root: &Path,
    ) -> Result<Self> {
        let client = ApiClient::new(
            config.base_url.clone().unwrap_or_default(),
            config.timeout(timeouts.http_request()),
            config.allow_insecure_tls,
        )?;
        Ok(Self::with_transport(environment, config, Arc::new(client), reports_root))
    }

    /// Build around an existing transport
    pub fn with_transport(
        environment: impl Into<String>,
        config: EnvironmentConfig,
        transport: Arc<dyn Transport>,
        reports_root: &Path,
    ) -> Self {
        let environment = environment.into();
        let tokens = match (&config.auth_url, &config.client_id, &config.client_secret) {
            (Some(auth_url), Some(id), Some(secret)) => Some(Arc::new(TokenCache::new(
                transport.clone(),
                auth_url,
                id.clone(),
                secret.clone(),
            ))),
            _ => {
                tracing::debug!("No client credentials configured; token auth disabled");
                None
            }
        };

        Self {
            tracker: tokio::sync::Mutex::new(ReportTracker::new(reports_root, environment.clone())),
            environment,
            config,
            transport,
            tokens,
            outcome: Mutex::new(SuiteOutcome::default()),
        }
    }

    pub fn outcome(&self) -> SuiteOutcome {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, status: RunStatus) {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(status);
    }

    /// Scenario start: bootstrap the world and open a run directory
    pub async fn begin_scenario(&self, world: &mut ApiWorld, scenario: &str, tags: &[String]) {
        world.bootstrap(self, scenario);

        if has_tag(tags, "api") {
            tracing::info!("Running API test: {}", scenario);
        }
        if has_tag(tags, "auth") {
            tracing::info!("Running authentication test");
        }

        if let Err(e) = self.tracker.lock().await.initialize_test_run(scenario) {
            tracing::warn!("Could not initialize test run for '{}': {}", scenario, e);
        }
    }

    /// Scenario end: record the outcome, write metadata, reset the world
    pub async fn finish_scenario(
        &self,
        world: Option<&mut ApiWorld>,
        scenario: &str,
        tags: &[String],
        steps: usize,
        status: RunStatus,
        failure: Option<String>,
    ) {
        self.record(status);

        let failure = world
            .as_ref()
            .and_then(|w| w.last_error.clone())
            .or(failure)
            .filter(|_| status == RunStatus::Failed);

        let mut update = MetadataUpdate::default().status(status).steps(steps);
        if let Some(message) = &failure {
            update = update.failure_message(message.clone());
        }
        if let Err(e) = self.tracker.lock().await.save_metadata(update) {
            tracing::warn!("Could not save metadata for '{}': {}", scenario, e);
        }

        match status {
            RunStatus::Passed => tracing::info!("Scenario passed: {}", scenario),
            RunStatus::Failed if has_tag(tags, "critical") => {
                tracing::error!("{}", critical_failure(scenario, failure.as_deref()));
            }
            RunStatus::Failed => tracing::warn!("Scenario failed: {}", scenario),
            RunStatus::Unknown => tracing::warn!("Scenario did not complete: {}", scenario),
        }

        if let Some(world) = world {
            tracing::debug!("Cleaning up {}", world.scenario_info());
            world.cleanup().await;
        }
    }
}

fn has_tag(tags: &[String], name: &str) -> bool {
    tags.iter().any(|t| t.trim_start_matches('@') == name)
}

fn critical_failure(scenario: &str, last_error: Option<&str>) -> String {
    match last_error {
        Some(message) => format!("CRITICAL TEST FAILED: {}\nLast Error: {}", scenario, message),
        None => format!("CRITICAL TEST FAILED: {}", scenario),
    }
}

fn scenario_tags(feature: &gherkin::Feature, scenario: &gherkin::Scenario) -> Vec<String> {
    feature
        .tags
        .iter()
        .chain(scenario.tags.iter())
        .cloned()
        .collect()
}

fn finished_status(finished: &ScenarioFinished) -> (RunStatus, Option<String>) {
    match finished {
        ScenarioFinished::StepPassed => (RunStatus::Passed, None),
        ScenarioFinished::StepSkipped => (RunStatus::Unknown, None),
        ScenarioFinished::StepFailed(.., err) => (RunStatus::Failed, Some(err.to_string())),
        ScenarioFinished::BeforeHookFailed(_) => {
            (RunStatus::Failed, Some("Before hook failed".to_string()))
        }
    }
}

/// Run every feature under `features`, one scenario at a time
///
/// Cucumber JSON goes to `<current_dir>/report.json`. The returned outcome
/// reflects scenario results only.
pub async fn run(ctx: Arc<SuiteContext>, features: &Path, current_dir: &Path) -> Result<SuiteOutcome> {
    if !features.exists() {
        return Err(Error::Config(format!(
            "Features directory not found: {}",
            features.display()
        )));
    }

    paths::ensure_dir(current_dir)?;
    let json_path = current_dir.join(JSON_REPORT_FILE);
    let json_file = std::fs::File::create(&json_path).map_err(|e| Error::filesystem(&json_path, e))?;

    tracing::info!(
        environment = %ctx.environment,
        features = %features.display(),
        "Starting test suite"
    );

    let before_ctx = Arc::clone(&ctx);
    let after_ctx = Arc::clone(&ctx);

    ApiWorld::cucumber()
        .max_concurrent_scenarios(1)
        .before(move |feature, _rule, scenario, world| {
            let ctx = Arc::clone(&before_ctx);
            async move {
                let tags = scenario_tags(feature, scenario);
                ctx.begin_scenario(world, &scenario.name, &tags).await;
            }
            .boxed_local()
        })
        .after(move |feature, _rule, scenario, finished, world| {
            let ctx = Arc::clone(&after_ctx);
            async move {
                let tags = scenario_tags(feature, scenario);
                let steps = feature.background.as_ref().map_or(0, |b| b.steps.len())
                    + scenario.steps.len();
                let (status, failure) = finished_status(finished);
                ctx.finish_scenario(world, &scenario.name, &tags, steps, status, failure)
                    .await;
            }
            .boxed_local()
        })
        .with_writer(writer::Json::new(json_file))
        .with_default_cli()
        .run(features)
        .await;

    let outcome = ctx.outcome();
    tracing::info!(
        passed = outcome.passed,
        failed = outcome.failed,
        skipped = outcome.skipped,
        "Test suite finished"
    );
    Ok(outcome)
}
