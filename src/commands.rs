//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the feature suite, then process its reports
    Run {
        /// Folder containing .feature files (default: from config)
        #[arg(long)]
        features: Option<PathBuf>,

        /// Root folder for per-run report directories
        #[arg(long)]
        reports_dir: Option<PathBuf>,
    },

    /// Move raw runner reports into the latest run directory
    Process {
        /// Scratch folder holding report.json/report.html
        #[arg(long)]
        current: Option<PathBuf>,

        /// Root folder for per-run report directories
        #[arg(long)]
        reports_dir: Option<PathBuf>,
    },

    /// List recorded runs, newest first
    Runs {
        /// Root folder for per-run report directories
        #[arg(long)]
        reports_dir: Option<PathBuf>,

        /// Maximum number of runs to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Fetch a bearer token for a user
    Token {
        /// Username (default: configured credentials)
        #[arg(long)]
        username: Option<String>,

        /// Password (default: configured credentials)
        #[arg(long)]
        password: Option<String>,
    },

    /// Authenticate by e-mail and call an endpoint with the JWT
    Fetch {
        /// E-mail to authenticate with (default: AUTH_EMAIL or config)
        #[arg(long)]
        email: Option<String>,

        /// Endpoint path (default: configured endpoint_path)
        #[arg(long)]
        path: Option<String>,
    },
}

impl Commands {
    /// Whether this command writes the plain-text run log
    pub fn logs_to_file(&self) -> bool {
        matches!(self, Commands::Run { .. })
    }
}
