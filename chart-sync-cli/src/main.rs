mod commands;
mod mirror;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use core_runtime::logging::{init_logging, parse_level, LogFormat, LoggingConfig};

#[derive(Parser, Debug)]
#[command(
    name = "chart-sync",
    version,
    about = "Incrementally mirror the rhythm-game chart catalog"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true, env = "CHART_SYNC_LOG_LEVEL")]
    log_level: String,

    /// Log format (pretty, json, compact)
    #[arg(long, default_value = "compact", global = true)]
    log_format: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch catalog changes into the local mirror
    Sync(commands::sync::SyncArgs),
    /// Show the state of the local mirror
    Status {
        /// Directory holding the local mirror
        #[arg(long, env = "CHART_SYNC_MIRROR_DIR", default_value = "chart-mirror")]
        mirror_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format: LogFormat = cli.log_format.parse()?;
    init_logging(
        LoggingConfig::default()
            .with_level(parse_level(&cli.log_level)?)
            .with_format(format)
            .with_spans(false)
            .with_target(false),
    )
    .context("Failed to initialize logging")?;

    match cli.command {
        Commands::Sync(args) => commands::sync::execute(args).await,
        Commands::Status { mirror_dir } => commands::status::execute(&mirror_dir).await,
    }
}
