//! Main Entrypoint for the Nova voice agent.
//!
//! 1. Parses the run mode from the command line.
//! 2. Loads configuration from the environment, failing fast on bad values.
//! 3. Initializes logging for the run mode.
//! 4. Hands over to the console loop or the connected runtime.

use anyhow::Context;
use clap::{Parser, Subcommand};
use nova_agent::{config::Config, runtime};
use tracing::{Level, info};

#[derive(Parser)]
#[command(name = "agent", about = "Mode-driven voice agent", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone, Copy, Debug, PartialEq, Eq)]
enum Commands {
    /// Chat with the agent in the terminal; no transport connection.
    Console,
    /// Connect to the transport for interactive development (debug logging by default).
    Dev,
    /// Production service mode (JSON logs).
    Start,
}

fn init_logging(command: Commands, level: Option<Level>) {
    let fmt = tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339());
    match command {
        // stdout belongs to the conversation.
        Commands::Console => fmt
            .with_writer(std::io::stderr)
            .with_max_level(level.unwrap_or(Level::INFO))
            .init(),
        Commands::Dev => fmt.with_max_level(level.unwrap_or(Level::DEBUG)).init(),
        Commands::Start => fmt
            .json()
            .with_max_level(level.unwrap_or(Level::INFO))
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;
    if cli.command != Commands::Console {
        config
            .require_transport()
            .context("Failed to load configuration")?;
    }

    // --- 2. Initialize Logging ---
    init_logging(cli.command, config.log_level);
    info!(
        command = ?cli.command,
        mode = %config.mode,
        transport = ?config.transport,
        "Configuration loaded."
    );

    // --- 3. Run ---
    match cli.command {
        Commands::Console => runtime::run_console(&config).await,
        Commands::Dev | Commands::Start => runtime::run_connected(config).await,
    }
}
