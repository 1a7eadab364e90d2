//! `ticketry serve` — start the broker: register every configured agent
//! and run one `Worker` per agent until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use ticketry_core::config::load_config;
use ticketry_core::registry::{Registry, Sink};
use ticketry_core::store::JsonlStore;
use ticketry_core::ticket::{TicketMessage, EXTERNAL_SINK};

/// Prints messages routed to `_external` to stdout.
struct ConsoleSink;

#[async_trait]
impl Sink for ConsoleSink {
    async fn deliver(&self, msg: &TicketMessage) -> anyhow::Result<()> {
        crate::helpers::print_response(&format!("[{}] {}", msg.from, msg.content), false);
        Ok(())
    }
}

/// Run the serve command: register agents, spawn workers, block until Ctrl+C.
pub async fn run() -> Result<()> {
    let config = load_config(None);
    crate::helpers::print_banner();

    if config.agents.is_empty() {
        println!("{}", "  No agents configured. Run `ticketry onboard` first.".yellow());
        return Ok(());
    }

    let store = Arc::new(JsonlStore::new(None).context("failed to open ticket store")?);
    let registry = Arc::new(Registry::with_inbox_capacity(store, config.broker.inbox_capacity));
    registry.register_sink(EXTERNAL_SINK, Arc::new(ConsoleSink));

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();

    for entry in &config.agents {
        let workspace = crate::helpers::expand_tilde(&entry.workspace);
        std::fs::create_dir_all(&workspace)
            .with_context(|| format!("failed to create workspace for '{}'", entry.id))?;

        let inbox = registry
            .register_agent(&entry.id, None)
            .map_err(|e| anyhow::anyhow!("failed to register agent '{}': {}", entry.id, e))?;

        let worker = crate::agents::build_worker(entry, &config, &workspace, registry.clone())?;

        let worker_cancel = cancel.clone();
        info!(agent = %entry.id, "worker started");
        println!("  {} agent '{}' ({})", "\u{2713}".green(), entry.id, entry.provider_selector);
        handles.push(tokio::spawn(async move {
            worker.run(inbox, worker_cancel).await;
        }));
    }

    println!();
    println!("{}", format!("  {} agent(s) running. Press Ctrl+C to stop.", handles.len()).dimmed());
    println!();

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    println!();
    println!("{}", "  Shutting down...".yellow());
    cancel.cancel();

    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}
