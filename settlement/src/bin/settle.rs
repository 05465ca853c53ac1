//! Settlement command-line front end
//!
//! Reads a JSON ledger snapshot and prints balances or a settlement plan as
//! JSON on stdout. Logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use settlement::{
    config::{LogFormat, LoggingConfig},
    Config, GroupId, LedgerSnapshot, SettlementEngine, UserId,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "settle", version, about = "Compute expense balances and settlement plans")]
struct Cli {
    /// Ledger snapshot file (JSON)
    ledger: PathBuf,

    /// Configuration file (TOML); falls back to SETTLE_CONFIG, then environment
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Outstanding balances of one user
    Balances {
        /// Perspective user id
        #[arg(long)]
        user: String,

        /// Restrict to one group
        #[arg(long)]
        group: Option<String>,
    },

    /// Minimal transfers that settle every balance
    Plan {
        /// Restrict to one group
        #[arg(long)]
        group: Option<String>,
    },
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let path = path.or_else(|| std::env::var_os("SETTLE_CONFIG").map(PathBuf::from));
    match path {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Config::from_env().context("loading config from environment"),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config)?;
    init_tracing(&config.logging);

    info!(
        service = %config.service_name,
        version = %config.service_version,
        "Starting settlement run"
    );

    let engine = SettlementEngine::new(config)?;
    let ledger = LedgerSnapshot::from_file(&cli.ledger)
        .with_context(|| format!("reading ledger {}", cli.ledger.display()))?;

    let scope = |group: Option<String>| match group {
        Some(group) => ledger.for_group(&GroupId::new(group)),
        None => ledger.clone(),
    };

    let output = match cli.command {
        Command::Balances { user, group } => {
            let summary = engine.balance_summary(&scope(group), &UserId::new(user))?;
            serde_json::to_string_pretty(&summary)?
        }
        Command::Plan { group } => {
            let plan = engine.plan(&scope(group))?;
            serde_json::to_string_pretty(&plan)?
        }
    };

    println!("{}", output);
    Ok(())
}
