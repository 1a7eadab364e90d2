//! Ticketry CLI — entry point.
//!
//! # Commands
//!
//! - `ticketry onboard` — initialize config, per-agent workspaces, ticket store
//! - `ticketry status` — show configuration and provider status
//! - `ticketry serve` — start the broker: one Worker per configured agent
//! - `ticketry send` — single-shot: route one message to an agent and print its reply

mod agents;
mod helpers;
mod onboard;
mod send;
mod serve;
mod status;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Ticketry — a ticket-based multi-agent LLM broker runtime.
#[derive(Parser)]
#[command(name = "ticketry", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true, default_value_t = false)]
    logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration, workspaces, and the ticket store
    Onboard,

    /// Show configuration and provider status
    Status,

    /// Start the broker (one Worker per configured agent, runs until Ctrl+C)
    Serve,

    /// Send a single message to an agent and print its reply
    Send {
        /// Agent id to route the message to (must be configured)
        #[arg(short, long)]
        agent: String,

        /// Message content
        #[arg(short, long)]
        message: String,

        /// Reuse an existing ticket instead of creating a new one
        #[arg(short, long)]
        ticket: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.logs);

    match cli.command {
        Commands::Onboard => onboard::run(),
        Commands::Status => status::run(),
        Commands::Serve => serve::run().await,
        Commands::Send { agent, message, ticket } => send::run(&agent, &message, ticket.as_deref()).await,
    }
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("ticketry=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}
