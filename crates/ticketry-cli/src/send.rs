//! `ticketry send` — single-shot: create or reuse a ticket, route one
//! message to an agent, print its first response, and exit.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ticketry_core::config::load_config;
use ticketry_core::registry::{Registry, Sink};
use ticketry_core::store::JsonlStore;
use ticketry_core::ticket::{TicketMessage, EXTERNAL_SINK};
use ticketry_core::utils::truncate_string;

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(120);

/// Forwards every delivered message into an unbounded channel the caller
/// drains for the first reply.
struct CaptureSink {
    tx: mpsc::UnboundedSender<TicketMessage>,
}

#[async_trait]
impl Sink for CaptureSink {
    async fn deliver(&self, msg: &TicketMessage) -> anyhow::Result<()> {
        let _ = self.tx.send(msg.clone());
        Ok(())
    }
}

/// Run the send command. `ticket_id` reuses an existing ticket; otherwise a
/// fresh one is created with `agent_id` as its sole participant.
pub async fn run(agent_id: &str, message: &str, ticket_id: Option<&str>) -> Result<()> {
    let config = load_config(None);
    let entry = config
        .agents
        .iter()
        .find(|a| a.id == agent_id)
        .with_context(|| format!("no agent named '{agent_id}' in config"))?;

    let store = Arc::new(JsonlStore::new(None).context("failed to open ticket store")?);
    let registry = Arc::new(Registry::with_inbox_capacity(store, config.broker.inbox_capacity));

    let (tx, mut rx) = mpsc::unbounded_channel();
    registry.register_sink(EXTERNAL_SINK, Arc::new(CaptureSink { tx }));

    let workspace = crate::helpers::expand_tilde(&entry.workspace);
    std::fs::create_dir_all(&workspace).with_context(|| format!("failed to create workspace for '{agent_id}'"))?;

    let inbox = registry
        .register_agent(agent_id, Some(EXTERNAL_SINK))
        .map_err(|e| anyhow::anyhow!("failed to register agent '{agent_id}': {e}"))?;

    let worker = crate::agents::build_worker(entry, &config, &workspace, registry.clone())?;
    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let worker_handle = tokio::spawn(async move {
        worker.run(inbox, worker_cancel).await;
    });

    let ticket = match ticket_id {
        Some(id) => registry.get_ticket(id).await.context("ticket not found")?,
        None => {
            let title = truncate_string(message, 60);
            registry
                .create_ticket(EXTERNAL_SINK, &title, message, "", vec![agent_id.to_string()], Default::default())
                .await?
        }
    };

    registry
        .route_message(TicketMessage::new(EXTERNAL_SINK, vec![agent_id.to_string()], message, ticket.id.clone()))
        .await?;

    let outcome = tokio::time::timeout(RESPONSE_TIMEOUT, rx.recv()).await;

    cancel.cancel();
    let _ = worker_handle.await;

    match outcome {
        Ok(Some(reply)) => {
            println!("ticket: {}", ticket.id);
            crate::helpers::print_response(&reply.content, true);
            Ok(())
        }
        Ok(None) => bail!("the broker shut down before a response arrived"),
        Err(_) => bail!("timed out after {}s waiting for a response (ticket {})", RESPONSE_TIMEOUT.as_secs(), ticket.id),
    }
}
