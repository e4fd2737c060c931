mod config;
mod credentials;
mod error;
mod format;
mod models;
mod projection;
mod quota;
mod service;

use chrono::Utc;
use clap::{Parser, Subcommand};
use config::{
    apply_overrides, config_path, credentials_path, ensure_initialized, load_config, AppConfig,
    CredentialSourceKind, Overrides,
};
use error::AppError;
use service::QuotaService;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "claude-quota")]
#[command(about = "Claude usage quota monitor with saturation projection")]
struct Cli {
    /// Poll interval in seconds (env: CLAUDE_QUOTA_POLL_INTERVAL)
    #[arg(long, global = true)]
    poll_interval: Option<u64>,

    /// Home directory holding .claude/.credentials.json (env: CLAUDE_QUOTA_CLAUDE_HOME)
    #[arg(long, global = true)]
    claude_home: Option<PathBuf>,

    /// Where to read the OAuth token from (env: CLAUDE_QUOTA_CREDENTIAL_SOURCE)
    #[arg(long, global = true, value_enum)]
    credential_source: Option<CredentialSourceKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the config file with defaults
    Init,
    /// Fetch once and print the quota
    Check,
    /// Poll until interrupted; press Enter to refresh immediately
    Watch,
    /// Print the config and credentials paths in use
    Paths,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("claude_quota=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn start_service(cfg: &AppConfig) -> Result<QuotaService, AppError> {
    QuotaService::new(cfg).inspect_err(|e| {
        if let AppError::Credential(_) = e {
            eprintln!("Claude credentials not usable: {e}");
            eprintln!("Expected: {}", credentials_path(cfg).display());
            eprintln!("Run 'claude login' to authenticate Claude Code first.");
        }
    })
}

fn resolve_config(overrides: &Overrides) -> Result<AppConfig, AppError> {
    let mut cfg = load_config()?;
    apply_overrides(&mut cfg, overrides, |key| std::env::var(key).ok());
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<ExitCode, AppError> {
    init_tracing();
    let cli = Cli::parse();
    let overrides = Overrides {
        poll_interval_seconds: cli.poll_interval,
        claude_home: cli.claude_home,
        credential_source: cli.credential_source,
    };

    match cli.command {
        Commands::Init => {
            let path = ensure_initialized()?;
            println!("Initialized claude-quota config at {}", path.display());
        }
        Commands::Paths => {
            let cfg = resolve_config(&overrides)?;
            println!("Config: {}", config_path()?.display());
            println!("Credentials: {}", credentials_path(&cfg).display());
            println!("Usage endpoint: {}", cfg.usage_url()?);
        }
        Commands::Check => {
            let cfg = resolve_config(&overrides)?;
            let service = start_service(&cfg)?;
            let (ok, snapshot) = service.check().await;
            println!("{}", format::tooltip(&snapshot, Utc::now()));
            if !ok {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Watch => {
            let cfg = resolve_config(&overrides)?;
            let service = start_service(&cfg)?;
            println!(
                "Polling every {}s. Press Enter to refresh, Ctrl-C to quit.",
                cfg.poll_interval_seconds
            );
            service.watch().await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
