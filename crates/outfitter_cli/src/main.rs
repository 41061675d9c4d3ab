//! Outfitter CLI - provision GitLab groups and projects for a
//! merge-request integration.

mod config_file;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::Term;
use outfitter::{ExitStatus, GitLabClient, Provisioner, ReqwestTransport};
use tracing_subscriber::EnvFilter;

/// Per-request timeout for GitLab API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variables checked (in order) for the GitLab credential.
const TOKEN_ENV_VARS: [&str; 2] = ["OUTFITTER_GITLAB_TOKEN", "GITLAB_TOKEN"];

#[derive(Parser)]
#[command(name = "outfitter")]
#[command(version)]
#[command(about = "Provision GitLab groups and projects with integration tokens and webhooks")]
#[command(
    long_about = "Outfitter converges a set of GitLab root groups and individual projects onto \
the access tokens and webhooks a merge-request integration needs. Runs are idempotent: existing \
valid tokens are left alone and webhooks are only created or updated when they drift from the \
desired configuration."
)]
#[command(after_long_help = r#"EXAMPLES
    Provision everything named in the configuration:
        $ outfitter apply --config outfitter.yaml

    See what would change without touching anything:
        $ outfitter apply --config outfitter.yaml --dry-run

    Validate credentials, permissions, and remote state:
        $ outfitter check --config outfitter.yaml

    Keep a machine-readable record of the run:
        $ outfitter apply --config outfitter.yaml --report report.json

ENVIRONMENT VARIABLES
    OUTFITTER_GITLAB_TOKEN    GitLab token used for every API call
    GITLAB_TOKEN              Fallback when OUTFITTER_GITLAB_TOKEN is unset
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update tokens and webhooks for every configured target
    Apply {
        /// Path to the YAML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Show what would change without calling any write endpoint
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Write the JSON action report to this path
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Log verbosity (error, warn, info, debug, trace)
        #[arg(short, long)]
        log_level: Option<String>,
    },
    /// Validate configuration and remote state without changing anything
    Check {
        /// Path to the YAML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Write the JSON action report to this path
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Log verbosity (error, warn, info, debug, trace)
        #[arg(short, long)]
        log_level: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(status) => ExitCode::from(status.code() as u8),
        Err(e) => {
            eprintln!("outfitter: {e}");
            ExitCode::from(ExitStatus::Fatal.code() as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitStatus, Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Apply {
            config,
            dry_run,
            report,
            log_level,
        } => {
            let mut cfg = config_file::load(&config)?;
            if dry_run {
                cfg.dry_run = true;
            }
            if let Some(level) = log_level {
                cfg.log_level = level;
            }
            init_tracing(&cfg.log_level);
            cfg.validate()?;

            let token = gitlab_token()?;
            let client = build_client(&cfg, &token)?;

            if cfg.dry_run && Term::stdout().is_term() {
                println!("DRY RUN - no changes will be made\n");
            }

            let mut provisioner = Provisioner::new(cfg, client);
            let status = provisioner.run().await;

            output::print_summaries(provisioner.report(), &token);
            output::log_statistics(provisioner.report());
            if let Some(path) = report {
                output::write_report(&path, provisioner.report())?;
            }
            Ok(status)
        }
        Commands::Check {
            config,
            report,
            log_level,
        } => {
            let mut cfg = config_file::load(&config)?;
            if let Some(level) = log_level {
                cfg.log_level = level;
            }
            init_tracing(&cfg.log_level);
            cfg.validate()?;

            let token = gitlab_token()?;
            let client = build_client(&cfg, &token)?;

            let mut provisioner = Provisioner::new(cfg, client);
            let status = provisioner.run_checks().await;

            output::print_check_table(&provisioner.report().check_results);
            if let Some(path) = report {
                output::write_report(&path, provisioner.report())?;
            }
            Ok(status)
        }
    }
}

fn build_client(
    cfg: &outfitter::Config,
    token: &str,
) -> Result<GitLabClient, Box<dyn std::error::Error>> {
    let transport = Arc::new(ReqwestTransport::with_timeout(REQUEST_TIMEOUT)?);
    Ok(GitLabClient::new(
        &cfg.gitlab_base_url,
        token,
        cfg.dry_run,
        transport,
    ))
}

/// The credential comes from the environment only; the configuration
/// file never carries it.
fn gitlab_token() -> Result<String, String> {
    TOKEN_ENV_VARS
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            format!(
                "GitLab token not found; set {} or {}",
                TOKEN_ENV_VARS[0], TOKEN_ENV_VARS[1]
            )
        })
}

/// Structured logs go to stderr so stdout stays reserved for the
/// summary and check-table output.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("outfitter={level},outfitter_cli={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
