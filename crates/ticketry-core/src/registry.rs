//! The Registry — the central broker owning ticket lifecycle, agent/sink
//! tables, and message routing.
//!
//! This is the single piece of truly process-wide shared state. Everything
//! else (Agent, Worker, tools) is handed a reference to one `Registry` and
//! never reaches for ambient globals.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::error::{BrokerError, BrokerResult};
use crate::store::{TicketFilter, TicketStore};
use crate::ticket::{Ticket, TicketMessage, TicketStatus, SYSTEM_SENDER};

/// Default bounded-inbox capacity for a newly registered agent.
pub const DEFAULT_INBOX_CAPACITY: usize = 64;

/// A non-agent named recipient bridging to an external system (e.g. a chat
/// platform). Registered under a name such as `_external`.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver a routed message. Failures are logged by the caller, never
    /// propagated — sink delivery is always best-effort.
    async fn deliver(&self, msg: &TicketMessage) -> anyhow::Result<()>;
}

/// Registry-internal record for a registered agent: its inbox sender plus
/// enough identity to report back to callers.
struct AgentHandle {
    inbox: tokio::sync::mpsc::Sender<TicketMessage>,
}

/// The broker. Holds the store plus the agents/sinks/creators maps behind a
/// single lock; the ticket store's own concurrency contract governs message
/// and ticket data.
pub struct Registry {
    store: Arc<dyn TicketStore>,
    agents: RwLock<HashMap<String, AgentHandle>>,
    sinks: RwLock<HashMap<String, Arc<dyn Sink>>>,
    creators: RwLock<HashMap<String, String>>,
    inbox_capacity: usize,
}

impl Registry {
    /// Build a registry backed by `store`, with the default inbox capacity.
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self::with_inbox_capacity(store, DEFAULT_INBOX_CAPACITY)
    }

    /// Build a registry with a custom per-agent inbox capacity.
    pub fn with_inbox_capacity(store: Arc<dyn TicketStore>, inbox_capacity: usize) -> Self {
        Self {
            store,
            agents: RwLock::new(HashMap::new()),
            sinks: RwLock::new(HashMap::new()),
            creators: RwLock::new(HashMap::new()),
            inbox_capacity,
        }
    }

    /// The ticket store this registry routes through.
    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.store
    }

    // ────────────── Agent lifecycle ──────────────

    /// Register an agent, allocating its bounded inbox. Returns the receive
    /// end so the caller can hand it to a `Worker`.
    ///
    /// Fails with `AlreadyExists` if `id` is already registered.
    pub fn register_agent(
        &self,
        id: &str,
        creator: Option<&str>,
    ) -> BrokerResult<tokio::sync::mpsc::Receiver<TicketMessage>> {
        let mut agents = self.agents.write().unwrap();
        if agents.contains_key(id) {
            return Err(BrokerError::AlreadyExists(format!("agent '{id}'")));
        }
        let (tx, rx) = tokio::sync::mpsc::channel(self.inbox_capacity);
        agents.insert(id.to_string(), AgentHandle { inbox: tx });
        if let Some(creator) = creator {
            self.creators
                .write()
                .unwrap()
                .insert(id.to_string(), creator.to_string());
        }
        info!(agent = id, "registered agent");
        Ok(rx)
    }

    /// Deregister an agent. Dropping the inbox sender closes the channel so
    /// the agent's `Worker` loop terminates cleanly.
    ///
    /// Fails with `NotFound` if `id` isn't registered.
    pub fn deregister_agent(&self, id: &str) -> BrokerResult<()> {
        let mut agents = self.agents.write().unwrap();
        if agents.remove(id).is_none() {
            return Err(BrokerError::NotFound(format!("agent '{id}'")));
        }
        self.creators.write().unwrap().remove(id);
        info!(agent = id, "deregistered agent");
        Ok(())
    }

    /// Register a sink under `name` (e.g. `_external`).
    pub fn register_sink(&self, name: &str, sink: Arc<dyn Sink>) {
        self.sinks.write().unwrap().insert(name.to_string(), sink);
        info!(sink = name, "registered sink");
    }

    /// List every registered agent id, sorted.
    pub fn list_agents(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.read().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The creator of a dynamically-created agent, if tracked.
    pub fn creator_of(&self, agent_id: &str) -> Option<String> {
        self.creators.read().unwrap().get(agent_id).cloned()
    }

    fn is_agent_registered(&self, id: &str) -> bool {
        self.agents.read().unwrap().contains_key(id)
    }

    // ────────────── Ticket lifecycle ──────────────

    /// Create a new open ticket. Does not send any message — callers route
    /// the initial body separately via `route_message`.
    pub async fn create_ticket(
        &self,
        from: &str,
        title: &str,
        goal: &str,
        parent_id: &str,
        waiting_on: Vec<String>,
        tags: std::collections::BTreeSet<String>,
    ) -> BrokerResult<Ticket> {
        let ticket = Ticket::new(from, title, goal, parent_id, waiting_on, tags);
        self.store.save(ticket.clone()).await?;
        info!(ticket = %ticket.id, from, "ticket created");
        Ok(ticket)
    }

    /// Route a message: persist unconditionally, then deliver to every
    /// recipient unless the ticket is closed.
    pub async fn route_message(&self, mut msg: TicketMessage) -> BrokerResult<()> {
        if msg.ticket_id.is_empty() {
            return Err(BrokerError::InvalidArgument("ticket_id is empty".into()));
        }
        if msg.id.is_empty() {
            msg.id = crate::ticket::generate_id();
        }

        let ticket = self.store.get(&msg.ticket_id).await?;
        self.store.append_message(&msg.ticket_id, msg.clone()).await?;

        if ticket.status == TicketStatus::Closed {
            info!(ticket = %msg.ticket_id, "message persisted but not delivered: ticket closed");
            return Ok(());
        }

        for recipient in &msg.to {
            self.deliver_to(recipient, &msg).await;
        }
        Ok(())
    }

    async fn deliver_to(&self, recipient: &str, msg: &TicketMessage) {
        let sender = {
            let agents = self.agents.read().unwrap();
            agents.get(recipient).map(|h| h.inbox.clone())
        };
        if let Some(sender) = sender {
            if sender.try_send(msg.clone()).is_err() {
                warn!(agent = recipient, ticket = %msg.ticket_id, "inbox full, dropping delivery");
            }
            return;
        }

        let sink = {
            let sinks = self.sinks.read().unwrap();
            sinks.get(recipient).cloned()
        };
        if let Some(sink) = sink {
            if let Err(e) = sink.deliver(msg).await {
                warn!(sink = recipient, error = %e, "sink delivery failed");
            }
            return;
        }

        warn!(recipient, ticket = %msg.ticket_id, "routing target not found");
    }

    /// Close a ticket, recording its summary and, if it has a parent,
    /// relaying the full conversation back to the parent's creator.
    ///
    /// Idempotent: closing an already-closed ticket succeeds without a
    /// second relay.
    pub async fn close_ticket(&self, id: &str, summary: &str) -> BrokerResult<()> {
        let ticket = self.store.get(id).await?;
        if ticket.status == TicketStatus::Closed {
            return Ok(());
        }

        self.store.close(id, summary).await?;
        info!(ticket = id, "ticket closed");

        if ticket.has_parent() {
            let closed = self.store.get(id).await?;
            let transcript: String = closed
                .messages
                .iter()
                .map(|m| format!("[{}]: {}", m.from, m.content))
                .collect::<Vec<_>>()
                .join("\n");
            let content = format!(
                "[Sub-ticket resolved: {}]\nSummary: {}\n\nFull conversation:\n{}",
                closed.title, summary, transcript
            );
            let relay = TicketMessage::new(
                SYSTEM_SENDER,
                vec![closed.created_by.clone()],
                content,
                ticket.parent_id.clone(),
            );
            self.route_message(relay).await?;
        }
        Ok(())
    }

    // ────────────── Query helpers ──────────────

    pub async fn get_ticket(&self, id: &str) -> BrokerResult<Ticket> {
        self.store.get(id).await
    }

    pub async fn list_tickets(&self, filter: &TicketFilter) -> BrokerResult<Vec<Ticket>> {
        self.store.list(filter).await
    }

    pub async fn count_tickets(&self, filter: &TicketFilter) -> BrokerResult<usize> {
        self.store.count(filter).await
    }

    /// All direct sub-tickets of `parent_id`.
    pub async fn list_sub_tickets(&self, parent_id: &str) -> BrokerResult<Vec<Ticket>> {
        self.store
            .list(&TicketFilter {
                parent_id: Some(parent_id.to_string()),
                ..Default::default()
            })
            .await
    }

    /// Whether `id` names a registered agent — used by tools validating
    /// recipient lists before creating a ticket.
    pub fn agent_exists(&self, id: &str) -> bool {
        self.is_agent_registered(id)
    }

    pub fn now(&self) -> chrono::DateTime<Utc> {
        Utc::now()
    }
}
