//! `issue-triage` entry point.
//!
//! This binary is the composition root. It:
//!
//! 1. **Parses configuration**: loads `triage.toml` and validates it.
//! 2. **Wires observability**: installs the `tracing` subscriber and, when
//!    configured, the OpenTelemetry OTLP exporter (see [`telemetry`]).
//! 3. **Constructs infrastructure**: builds the [`GithubClient`], optionally
//!    wrapped in a [`DryRunTracker`], and injects it into the
//!    [`TriageExecutor`].
//! 4. **Runs one batch** and prints the [`RunReport`].
//!
//! ## Exit status
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | every started issue reached `Done` |
//! | 1 | an issue `Failed`, discovery failed, or an unexpected error |
//! | 2 | configuration error (file, roster, credential) |

mod dry_run;
mod settings;
mod telemetry;

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use github::{GithubClient, GithubConfig, DEFAULT_API_BASE};
use orchestrator::{RunReport, TriageExecutor};
use pipeline::{ErrorClass, IssueTracker, Timestamp, TriageError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dry_run::DryRunTracker;
use crate::telemetry::LogFormat;

const EXIT_RUN_FAILED: u8 = 1;
const EXIT_CONFIGURATION: u8 = 2;

/// Classify, assign, and assess new GitHub issues.
#[derive(Debug, Parser)]
#[command(name = "issue-triage", version)]
struct Cli {
    /// Log output format (logs are written to stderr).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "ISSUE_TRIAGE_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Triage every unprocessed open issue once.
    Run(RunArgs),

    /// Validate the configuration file and print the effective settings.
    CheckConfig {
        #[arg(long, default_value = "triage.toml")]
        config: PathBuf,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, default_value = "triage.toml")]
    config: PathBuf,

    /// GitHub token with issues write access.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// REST API base URL (GitHub Enterprise uses `https://HOST/api/v3`).
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// List issues and log the writes that would be made, without making them.
    #[arg(long)]
    dry_run: bool,

    /// Only consider issues created at or after this RFC 3339 time.
    #[arg(long, value_parser = settings::parse_since)]
    since: Option<Timestamp>,

    /// Also write the run report as JSON to this path.
    #[arg(long)]
    report_json: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let telemetry = match telemetry::init(cli.log_format) {
        Ok(telemetry) => telemetry,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(EXIT_RUN_FAILED);
        }
    };

    let result = match cli.command {
        Command::Run(args) => run(args).await,
        Command::CheckConfig { config } => check_config(&config),
    };
    let code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_code_for(&e)
        }
    };

    telemetry.shutdown();
    ExitCode::from(code)
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<TriageError>() {
        Some(e) if e.class() == ErrorClass::Configuration => EXIT_CONFIGURATION,
        _ => EXIT_RUN_FAILED,
    }
}

async fn run(args: RunArgs) -> anyhow::Result<u8> {
    let config = settings::load(&args.config).context("failed to load configuration")?;
    let token = settings::require_token(args.token)?;

    let github_config = GithubConfig::new(token, &config)
        .with_api_base(args.api_base)
        .with_since(args.since);
    let github = GithubClient::new(github_config)
        .map_err(|e| TriageError::configuration(e.to_string()))?;
    let tracker: Arc<dyn IssueTracker> = if args.dry_run {
        info!("Dry run: no changes will be written");
        Arc::new(DryRunTracker::new(github))
    } else {
        Arc::new(github)
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; finishing issues already in progress");
                cancel.cancel();
            }
        }
    });

    let executor = TriageExecutor::new(Arc::new(config), tracker);
    let report = executor.run(cancel).await;

    print!("{report}");
    if let Some(path) = &args.report_json {
        write_report(path, &report)?;
    }

    Ok(if report.is_success() {
        0
    } else {
        EXIT_RUN_FAILED
    })
}

fn write_report(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report).context("failed to serialise run report")?;
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "Run report written");
    Ok(())
}

fn check_config(path: &Path) -> anyhow::Result<u8> {
    let config = settings::load(path).context("failed to load configuration")?;

    println!("repository: {}", config.repository);
    println!(
        "workers: {}  issue cap: {}  page size: {}",
        config.max_workers, config.max_issues, config.page_size
    );
    println!("sentinel label: {}", config.sentinel_label);
    println!("team:");
    for member in config.roster() {
        let domains: Vec<&str> = member.domains.iter().map(|d| d.as_str()).collect();
        println!("  {} [{}]", member.username, domains.join(", "));
    }
    println!("categories:");
    for rule in config.category_rules() {
        let domains: Vec<&str> = rule.domains.iter().map(|d| d.as_str()).collect();
        println!(
            "  {} (label {}) -> {}",
            rule.name,
            rule.label(),
            domains.join(", ")
        );
    }
    for domain in config.unstaffed_domains() {
        println!("warning: no team member covers domain '{domain}'");
    }
    Ok(0)
}
