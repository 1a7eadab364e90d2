//! The ambient per-turn context threaded through `Worker` → `Agent` →
//! `Tool::execute`, plus the system prompt assembler.
//!
//! One `TurnContext` is constructed by the `Worker` before calling the
//! `Agent` and discarded after the deferred-message flush; see
//! `Worker::handle_message`.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use ticketry_core::ticket::{Ticket, TicketMessage};
use ticketry_core::MemoryProvider;

use crate::tools::ToolRegistry;

// ─────────────────────────────────────────────
// TurnContext
// ─────────────────────────────────────────────

/// Per-turn ambient state. Tools read `current_ticket_id` and
/// `input_messages`, and mutate `responded`/`deferred_messages` to carry
/// their effects back to the `Worker` without routing immediately.
pub struct TurnContext {
    /// Ticket under which tools auto-attribute their actions.
    pub current_ticket_id: String,
    /// The agent id this turn is running as.
    pub agent_id: String,
    /// Read-only view of the prompt sent to the LLM this turn.
    pub input_messages: Vec<ticketry_core::types::Message>,
    responded: Mutex<bool>,
    deferred_messages: Mutex<Vec<TicketMessage>>,
}

impl TurnContext {
    pub fn new(
        agent_id: impl Into<String>,
        current_ticket_id: impl Into<String>,
        input_messages: Vec<ticketry_core::types::Message>,
    ) -> Self {
        Self {
            current_ticket_id: current_ticket_id.into(),
            agent_id: agent_id.into(),
            input_messages,
            responded: Mutex::new(false),
            deferred_messages: Mutex::new(Vec::new()),
        }
    }

    /// Mark the turn as responded — the Worker will not send an
    /// auto-response, and the ReAct loop short-circuits on the next check.
    pub fn mark_responded(&self) {
        *self.responded.lock().unwrap() = true;
    }

    /// Whether any tool has already dispatched a response or declared
    /// intent to wait this turn.
    pub fn has_responded(&self) -> bool {
        *self.responded.lock().unwrap()
    }

    /// Append an outgoing message to the deferred buffer. Flushed by the
    /// Worker, in append order, only after the Agent returns.
    pub fn defer_message(&self, msg: TicketMessage) {
        self.deferred_messages.lock().unwrap().push(msg);
    }

    /// Drain every deferred message, in append order.
    pub fn take_deferred(&self) -> Vec<TicketMessage> {
        std::mem::take(&mut self.deferred_messages.lock().unwrap())
    }
}

// ─────────────────────────────────────────────
// System prompt assembly
// ─────────────────────────────────────────────

/// Fixed platform-policy block taught to every agent, per §4.5.
const RULES_BLOCK: &str = "\
Always respond via `respond_to_ticket` — never answer with plain text.\n\
Only the ticket's creator may close it.\n\
Creators must close the ticket immediately once its goal is satisfied.\n\
Responders must not chit-chat; answer the goal and stop.";

/// Assembles the eight-section system prompt described by the ticket
/// protocol. Empty sections (4, 5, 6, and any of their subsections) are
/// omitted entirely rather than emitted blank.
pub struct SystemPromptBuilder;

impl SystemPromptBuilder {
    /// Build the full prompt for one turn.
    ///
    /// `static_context` is the agent's static scoped-context map (section
    /// 4); `memory` is consulted for section 5; `ticket` and its
    /// `sub_tickets` (unused directly here beyond message-count framing,
    /// kept for callers that want to fold sub-ticket summaries into
    /// `static_context`) drive section 6.
    pub fn build(
        agent_id: &str,
        role: &str,
        core_instructions: &str,
        static_context: &BTreeMap<String, String>,
        memory: Option<&dyn MemoryProvider>,
        ticket: &Ticket,
        tools: &ToolRegistry,
    ) -> String {
        let mut sections = Vec::new();

        // 1. Agent header
        let mut header = format!("# Agent: {agent_id}");
        if !role.is_empty() {
            header.push_str(&format!("\nRole: {role}"));
        }
        sections.push(header);

        // 2. Core instructions verbatim
        if !core_instructions.is_empty() {
            sections.push(core_instructions.to_string());
        }

        // 3. Current time
        sections.push(format!(
            "# Current Time\n{}",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        ));

        // 4. Context
        if !static_context.is_empty() {
            let body: String = static_context
                .iter()
                .map(|(k, v)| format!("## {k}\n\n{v}"))
                .collect::<Vec<_>>()
                .join("\n\n");
            sections.push(format!("# Context\n\n{body}"));
        }

        // 5. Memory
        if let Some(memory) = memory {
            let scopes = memory.list();
            if !scopes.is_empty() {
                let body: String = scopes
                    .iter()
                    .map(|(scope, content)| format!("## {scope}\n\n{content}"))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                sections.push(format!("# Memory\n\n{body}"));
            }
        }

        // 6. Current ticket
        let stance = if ticket.created_by == agent_id {
            "creator"
        } else {
            "responder"
        };
        sections.push(format!(
            "# Current Ticket\nID: {}\nTitle: {}\nGoal: {}\nStatus: {:?}\nYou are: {}\nMessages: {}",
            ticket.id,
            ticket.title,
            ticket.goal,
            ticket.status,
            stance,
            ticket.messages.len()
        ));

        // 7. Available tools
        let defs = tools.get_definitions();
        if !defs.is_empty() {
            let body: String = defs
                .iter()
                .map(|d| format!("- **{}**: {}", d.function.name, d.function.description))
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(format!("# Available Tools\n{body}"));
        }

        // 8. Rules
        sections.push(format!("# Rules\n{RULES_BLOCK}"));

        sections.join("\n\n")
    }
}
