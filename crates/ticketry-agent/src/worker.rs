//! One Worker per registered agent: consumes its inbox, builds the turn's
//! prompt, drives the Agent, applies the nudge policy, retries on
//! transient failure, and flushes deferred messages.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ticketry_core::agent_spec::AgentSpec;
use ticketry_core::memory::MemoryProvider;
use ticketry_core::registry::Registry;
use ticketry_core::ticket::TicketMessage;
use ticketry_core::types::Message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::Agent;
use crate::context::{SystemPromptBuilder, TurnContext};

/// Suggested default retry count for a failing `Agent::run`.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Suggested default delay between retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

const NUDGE_TEXT: &str = "Do not reply with plain text. Use respond_to_ticket. Set goal_met=true if the goal is satisfied.";

/// Drives one agent's inbox to completion, turn by turn.
pub struct Worker {
    spec: AgentSpec,
    agent: Agent,
    registry: Arc<Registry>,
    memory: Option<Arc<dyn MemoryProvider>>,
    static_context: BTreeMap<String, String>,
    max_retries: usize,
    retry_delay: Duration,
}

impl Worker {
    pub fn new(spec: AgentSpec, agent: Agent, registry: Arc<Registry>) -> Self {
        Self {
            spec,
            agent,
            registry,
            memory: None,
            static_context: BTreeMap::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryProvider>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_static_context(mut self, ctx: BTreeMap<String, String>) -> Self {
        self.static_context = ctx;
        self
    }

    pub fn with_max_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_retry_delay(mut self, d: Duration) -> Self {
        self.retry_delay = d;
        self
    }

    /// Consume `inbox` until it closes (clean shutdown after Deregister) or
    /// `cancel` fires.
    pub async fn run(&self, mut inbox: mpsc::Receiver<TicketMessage>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(agent = %self.spec.id, "worker cancelled");
                    return;
                }
                maybe_msg = inbox.recv() => {
                    match maybe_msg {
                        None => {
                            info!(agent = %self.spec.id, "inbox closed, worker exiting");
                            return;
                        }
                        Some(msg) => self.handle_message(&msg, &cancel).await,
                    }
                }
            }
        }
    }

    /// Process one inbound message to completion, including retries and
    /// the nudge re-run, then flush every deferred message.
    pub async fn handle_message(&self, msg: &TicketMessage, cancel: &CancellationToken) {
        for attempt in 0..self.max_retries.max(1) {
            if cancel.is_cancelled() {
                return;
            }

            let ticket = match self.registry.get_ticket(&msg.ticket_id).await {
                Ok(t) => t,
                Err(e) => {
                    warn!(agent = %self.spec.id, ticket = %msg.ticket_id, error = %e, "cannot load ticket, dropping message");
                    return;
                }
            };

            let mut context_map = self.static_context.clone();
            if let Ok(subs) = self.registry.list_sub_tickets(&ticket.id).await {
                if !subs.is_empty() {
                    let body = subs
                        .iter()
                        .map(|s| format!("- {} [{:?}]: {}", s.id, s.status, s.title))
                        .collect::<Vec<_>>()
                        .join("\n");
                    context_map.insert("Sub-tickets".to_string(), body);
                }
            }

            let system_prompt = SystemPromptBuilder::build(
                &self.spec.id,
                &self.spec.role,
                &self.spec.core_instructions,
                &context_map,
                self.memory.as_deref(),
                &ticket,
                self.agent.tools(),
            );

            let mut messages = vec![Message::system(system_prompt)];
            for m in &ticket.messages {
                let framed = format!("[{}]: {}", m.from, m.content);
                if m.from == self.spec.id {
                    messages.push(Message::assistant(framed));
                } else {
                    messages.push(Message::user(framed));
                }
            }

            let mut ctx = TurnContext::new(self.spec.id.clone(), ticket.id.clone(), messages);

            match self.agent.run(&ctx, cancel).await {
                Ok(text) => {
                    if !text.is_empty() && !ctx.has_responded() {
                        ctx.input_messages.push(Message::assistant(text));
                        ctx.input_messages.push(Message::user(NUDGE_TEXT));
                        // Ignored: the second attempt's text is discarded by design;
                        // its side effects (deferred messages, responded flag) still count.
                        let _ = self.agent.run(&ctx, cancel).await;
                    }

                    for deferred in ctx.take_deferred() {
                        if let Err(e) = self.registry.route_message(deferred).await {
                            warn!(agent = %self.spec.id, error = %e, "failed to route deferred message");
                        }
                    }
                    return;
                }
                Err(e) => {
                    error!(
                        agent = %self.spec.id,
                        ticket = %msg.ticket_id,
                        attempt,
                        error = %e,
                        "agent run failed, audit entry recorded"
                    );
                    if attempt + 1 >= self.max_retries {
                        return;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }
    }
}
