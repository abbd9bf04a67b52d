use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "aquasync")]
#[command(author, version, about = "Hydration tracker for AquaSense smart bottles", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for nearby bottles
    Scan {
        /// Scan timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Sync a reading from the bottle and log intake
    Sync {
        /// Extra attempts if the bottle fails to advertise
        #[arg(short, long, default_value = "0")]
        retries: u32,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Skip the battery read after syncing
        #[arg(long)]
        no_battery: bool,
    },

    /// Read the bottle's battery level
    Battery,

    /// Show progress against the daily goal
    Status {
        /// Day to show (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Show or set the daily goal in fluid ounces
    Goal {
        /// New goal; omit to show the current one
        ounces: Option<f64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "aquasync=debug,info"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan { timeout } => commands::scan::run(&config, timeout).await,
        Commands::Sync {
            retries,
            format,
            no_battery,
        } => commands::sync::run(&config, retries, format, no_battery).await,
        Commands::Battery => commands::battery::run(&config).await,
        Commands::Status { date } => commands::status::run(&config, date.as_deref()),
        Commands::Goal { ounces } => commands::goal::run(&config, cli.config.as_deref(), ounces),
    }
}
