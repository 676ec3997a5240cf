//! Markpull command-line shell.
//!
//! Loads configuration, builds an authenticated registry session and hands
//! the run to the acquisition engine. Everything interesting happens in the
//! library crates.

mod commands;
mod progress;
mod state;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

/// Pull marking codes and documents from the registry into delimited files.
#[derive(Debug, Parser)]
#[command(name = "markpull", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Registry bearer token
    #[arg(long, env = "MARKPULL_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Do not draw the progress spinner
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Print the run summary as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Export marking codes matching a filter
    Codes(RunArgs),
    /// Export line items of every document not exported before
    Documents(RunArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    /// Write the effective configuration to the config file instead
    #[arg(long)]
    init: bool,
}

/// Options shared by every acquisition command.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Search filter as a JSON object
    #[arg(long, default_value = "{}")]
    filter: String,

    /// Maximum concurrent page fetches
    #[arg(short = 'k', long)]
    concurrency: Option<usize>,

    /// Directory for the exported file
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,markpull=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    info!("Starting Markpull v{}", env!("CARGO_PKG_VERSION"));

    let config = markpull_core::AppConfig::load_with_env()?;
    let output = commands::Output {
        quiet: cli.quiet,
        json: cli.json,
    };

    match &cli.command {
        Command::Codes(args) => {
            let state = state::AppState::new(config, cli.token.as_deref(), args)?;
            commands::codes::run(&state, args, output).await
        }
        Command::Documents(args) => {
            let state = state::AppState::new(config, cli.token.as_deref(), args)?;
            commands::documents::run(&state, args, output).await
        }
        Command::Config(args) if args.init => commands::init_config(&config),
        Command::Config(_) => commands::show_config(&config),
    }
}
