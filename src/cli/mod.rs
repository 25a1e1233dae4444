//! CLI command handling
//!
//! Dispatches CLI commands and formats output. Every command resolves to a
//! process exit code.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use colored::Colorize;

use crate::bdd::{self, SuiteContext, SuiteOutcome};
use crate::commands::Commands;
use api_harness::api::EmailAuthService;
use api_harness::auth::TokenCache;
use api_harness::common::config::{environment_name, ConfigStore, EnvironmentConfig, HarnessSettings};
use api_harness::common::{logging, truncate_secret, Error, Result};
use api_harness::http::ApiClient;
use api_harness::report::{list_runs, PollSettings, ProcessSummary, ReportProcessor, RunStatus, RunSummary};

/// Dispatch a CLI command and return the exit code
pub async fn dispatch(config: Option<&Path>, env: Option<&str>, command: Commands) -> i32 {
    let mut store = ConfigStore::discover(config);
    let harness = match store.harness() {
        Ok(harness) => harness,
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };

    let log_file = if command.logs_to_file() {
        harness.log_file.clone()
    } else {
        None
    };
    if let Some(path) = &log_file {
        if let Err(e) = logging::truncate_log(path) {
            eprintln!("Warning: Could not truncate {}: {}", path.display(), e);
        }
    }
    let level = std::env::var("LOG_LEVEL").ok();
    let mut guard = logging::init(level.as_deref(), log_file.as_deref());

    let environment = environment_name(env);
    tracing::debug!(
        environment = %environment,
        config = ?store.path(),
        "Resolved configuration"
    );

    let result = match command {
        Commands::Run {
            features,
            reports_dir,
        } => {
            run_suite(&mut store, &harness, &environment, features, reports_dir, log_file, &mut guard)
                .await
        },

        Commands::Process {
            current,
            reports_dir,
        } => {
            let current = current.unwrap_or_else(|| harness.current_report_dir.clone());
            let root = reports_dir.unwrap_or_else(|| harness.reports_root());
            let summary = ReportProcessor::new(current, root)
                .with_poll(PollSettings::from(&harness.timeouts))
                .with_log_file(harness.log_file.clone())
                .process()
                .await;
            print_process_summary(&summary);
            Ok(0)
        }

        Commands::Runs { reports_dir, limit } => {
            let root = reports_dir.unwrap_or_else(|| harness.reports_root());
            list_runs(&root).map(|runs| {
                if runs.is_empty() {
                    println!("No test runs found in {}", root.display());
                } else {
                    println!("Test runs in {} ({} total):", root.display(), runs.len());
                    for run in runs.iter().take(limit) {
                        print_run(run);
                    }
                }
                0
            })
        }

        Commands::Token { username, password } => {
            fetch_token(&mut store, &harness, &environment, username, password).await
        }

        Commands::Fetch { email, path } => {
            match fetch(&mut store, &environment, email, path).await {
                Ok(code) => Ok(code),
                Err(e) => {
                    tracing::error!("[{}] {}", e.kind(), e);
                    eprintln!("Error: {e}");
                    Ok(2)
                }
            }
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("[{}] {}", e.kind(), e);
            eprintln!("Error: {e}");
            1
        }
    }
}

async fn run_suite(
    store: &mut ConfigStore,
    harness: &HarnessSettings,
    environment: &str,
    features: Option<PathBuf>,
    reports_dir: Option<PathBuf>,
    log_file: Option<PathBuf>,
    guard: &mut logging::LogGuard,
) -> Result<i32> {
    let features = features.unwrap_or_else(|| harness.features_dir.clone());
    let reports_root = reports_dir.unwrap_or_else(|| harness.reports_root());

    let config = match store.load(environment) {
        Ok(config) => config.clone(),
        Err(e) => {
            tracing::warn!("{}; scenarios that need configuration will fail", e);
            EnvironmentConfig::default()
        }
    };

    let ctx = Arc::new(SuiteContext::new(environment, config, &harness.timeouts, &reports_root)?);
    let outcome = bdd::run(ctx, &features, &harness.current_report_dir).await?;

    // The index embeds test.log, so every suite line must be on disk first
    guard.flush_file();

    let summary = ReportProcessor::new(&harness.current_report_dir, &reports_root)
        .with_poll(PollSettings::from(&harness.timeouts))
        .with_log_file(log_file)
        .process()
        .await;
    print_process_summary(&summary);
    print_outcome(&outcome);

    Ok(if outcome.success() { 0 } else { 1 })
}

async fn fetch_token(
    store: &mut ConfigStore,
    harness: &HarnessSettings,
    environment: &str,
    username: Option<String>,
    password: Option<String>,
) -> Result<i32> {
    let config = store.load(environment)?.clone();
    let (Some(auth_url), Some(client_id), Some(client_secret)) =
        (&config.auth_url, &config.client_id, &config.client_secret)
    else {
        return Err(Error::Config(format!(
            "auth_url, client_id and client_secret must be set for environment '{environment}'"
        )));
    };

    let configured = config.credentials.clone();
    let username = username.or_else(|| configured.as_ref().map(|c| c.username.clone()));
    let password = password.or_else(|| configured.as_ref().map(|c| c.password.clone()));
    let (Some(username), Some(password)) = (username, password) else {
        return Err(Error::CredentialsNotSet);
    };

    let client = ApiClient::new(
        config.base_url.clone().unwrap_or_default(),
        config.timeout(harness.timeouts.http_request()),
        config.allow_insecure_tls,
    )?;
    let tokens = TokenCache::new(Arc::new(client), auth_url, client_id.clone(), client_secret.clone());

    let token = tokens.get_token(&username, &password).await?;
    println!("Token: {}", truncate_secret(&token, 20));
    if let Some(expiry) = tokens.expiry(&username, &password).await {
        println!(
            "Expires: {}",
            expiry.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(0)
}

async fn fetch(
    store: &mut ConfigStore,
    environment: &str,
    email: Option<String>,
    path: Option<String>,
) -> Result<i32> {
    let config = store.load(environment)?.clone();
    let Some(email) = email.or_else(|| config.email.clone()).filter(|e| !e.is_empty()) else {
        eprintln!("Error: No email provided. Use --email or set AUTH_EMAIL");
        return Ok(1);
    };

    let client = ApiClient::new(
        config.base_url.clone().unwrap_or_default(),
        config.timeout(api_harness::http::client::DEFAULT_TIMEOUT),
        config.allow_insecure_tls,
    )?;
    let mut service = EmailAuthService::new(Arc::new(client), &config);
    if let Some(path) = path {
        service.set_endpoint_path(path);
    }

    println!("Authenticating as {}...", email);
    let response = service.fetch_data(Some(&email)).await?;
    println!("{} Status: {}", "✓".green(), response.status);
    println!("  Records: {}", response.records().len());
    println!("{}", response);
    Ok(0)
}

fn status_label(status: RunStatus) -> colored::ColoredString {
    let label = status.to_string();
    match status {
        RunStatus::Passed => label.green().bold(),
        RunStatus::Failed => label.red().bold(),
        RunStatus::Unknown => label.yellow(),
    }
}

fn print_run(run: &RunSummary) {
    let Some(metadata) = &run.metadata else {
        println!("  {:<8} {}", status_label(RunStatus::Unknown), run.name);
        return;
    };

    println!(
        "  {:<8} {}  ({}, {}ms, {} steps)",
        status_label(metadata.status),
        run.name,
        metadata.environment,
        metadata.duration,
        metadata.steps
    );
    if let Some(message) = &metadata.failure_message {
        println!("           {}", message.dimmed());
    }
}

fn print_process_summary(summary: &ProcessSummary) {
    if summary.skipped {
        println!("No reports to process");
        return;
    }

    if let Some(dir) = &summary.run_dir {
        println!("Reports saved to {}", dir.display());
    }
    for file in &summary.copied {
        println!("  {} {}", "✓".green(), file.display());
    }
    if let Some(index) = &summary.index {
        println!("  {} {}", "✓".green(), index.display());
    }
    for warning in &summary.warnings {
        println!("  {} {}", "!".yellow(), warning);
    }
}

fn print_outcome(outcome: &SuiteOutcome) {
    let line = format!(
        "{} scenarios ({} passed, {} failed, {} skipped)",
        outcome.total(),
        outcome.passed,
        outcome.failed,
        outcome.skipped
    );
    if outcome.success() {
        println!("\n{} {}\n", "✓".green().bold(), line.green().bold());
    } else {
        println!("\n{} {}\n", "✗".red().bold(), line.red().bold());
    }
}
