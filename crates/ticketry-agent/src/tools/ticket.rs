//! The Ticket Tool Protocol — the six tools that let an agent author its own
//! routing and delegation decisions: `create_ticket`, `respond_to_ticket`,
//! `close_ticket`, `wait`, `search_tickets`, `get_ticket`.
//!
//! Each tool holds an `Arc<Registry>` and reads/mutates the ambient
//! `TurnContext` passed into `execute`. None of these tools touch the
//! filesystem or network — every effect flows through the `Registry`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use ticketry_core::ticket::{Ticket, TicketMessage, TicketStatus};
use ticketry_core::{Registry, TicketFilter};

use super::base::{optional_bool, optional_i64, optional_string, require_string, Tool};
use crate::context::TurnContext;

fn current_ticket_id(ctx: &TurnContext) -> anyhow::Result<&str> {
    if ctx.current_ticket_id.is_empty() {
        anyhow::bail!("no current ticket in this context");
    }
    Ok(&ctx.current_ticket_id)
}

// ─────────────────────────────────────────────
// create_ticket
// ─────────────────────────────────────────────

/// Creates a new ticket addressed to one or more agents, optionally
/// parented under the caller's current ticket. Guards against the
/// same-recipient loop described in the protocol's loop-prevention policy.
pub struct CreateTicketTool {
    registry: Arc<Registry>,
}

impl CreateTicketTool {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for CreateTicketTool {
    fn name(&self) -> &str {
        "create_ticket"
    }

    fn description(&self) -> &str {
        "Create a new ticket addressed to one or more agents, optionally as a sub-ticket of the current one"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "to": {"type": "array", "items": {"type": "string"}, "description": "Agent ids to address the ticket to"},
                "title": {"type": "string"},
                "goal": {"type": "string", "description": "The completion condition for this ticket"},
                "message": {"type": "string", "description": "Optional initial message body"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "confirmed": {"type": "boolean", "description": "Set true (with reason) to override a loop-prevention advisory"},
                "reason": {"type": "string", "description": "Required when confirmed=true"}
            },
            "required": ["to", "title", "goal"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>, ctx: &TurnContext) -> anyhow::Result<String> {
        let title = require_string(&params, "title")?;
        let goal = require_string(&params, "goal")?;
        let to: Vec<String> = params
            .get("to")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        if title.trim().is_empty() {
            anyhow::bail!("title must not be empty");
        }
        if goal.trim().is_empty() {
            anyhow::bail!("goal must not be empty");
        }
        if to.is_empty() {
            anyhow::bail!("to must not be empty");
        }
        if to.iter().any(|id| id == &ctx.agent_id) {
            anyhow::bail!("cannot assign a ticket to yourself");
        }
        let unknown: Vec<&String> = to.iter().filter(|id| !self.registry.agent_exists(id)).collect();
        if !unknown.is_empty() {
            let valid = self.registry.list_agents().join(", ");
            anyhow::bail!(
                "unknown recipient(s): {} — registered agents: {}",
                unknown.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "),
                valid
            );
        }

        let message = optional_string(&params, "message");
        let tags: BTreeSet<String> = params
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let confirmed = optional_bool(&params, "confirmed");
        let reason = optional_string(&params, "reason");

        let parent_id = ctx.current_ticket_id.clone();

        if !parent_id.is_empty() {
            if let Ok(parent) = self.registry.get_ticket(&parent_id).await {
                let already_participant = to
                    .iter()
                    .any(|id| parent.created_by == *id || parent.waiting_on.iter().any(|w| w == id));
                let needs_confirmation = parent.status == TicketStatus::AwaitingClose || already_participant;

                if needs_confirmation && !confirmed {
                    return Ok(format!(
                        "CONFIRMATION REQUIRED: creating a ticket to {} from within ticket '{}' ({}) looks like it could loop — \
                         the parent is {} and/or the recipient is already a participant on it. \
                         Consider `respond_to_ticket`, `close_ticket`, or `wait` instead. \
                         If you really need a new sub-ticket, retry with confirmed=true and a non-empty reason.",
                        to.join(", "),
                        parent.title,
                        parent.id,
                        if parent.status == TicketStatus::AwaitingClose { "awaiting close" } else { "open" }
                    ));
                }
                if confirmed && reason.as_deref().unwrap_or("").trim().is_empty() {
                    anyhow::bail!("confirmed=true requires a non-empty reason");
                }
            }
        }

        let ticket = self
            .registry
            .create_ticket(&ctx.agent_id, &title, &goal, &parent_id, to.clone(), tags)
            .await?;

        let mut content = format!("{title}\n\n{goal}");
        if let Some(m) = message {
            content.push_str(&format!("\n\n{m}"));
        }
        let msg = TicketMessage::new(ctx.agent_id.clone(), to, content, ticket.id.clone());
        self.registry.route_message(msg).await?;

        Ok(format!("Ticket created: {} ({})", ticket.id, ticket.title))
    }
}

// ─────────────────────────────────────────────
// respond_to_ticket
// ─────────────────────────────────────────────

/// Defers an outgoing response to every participant but the caller, and
/// drives the `open <-> awaiting_close` status transition.
pub struct RespondToTicketTool {
    registry: Arc<Registry>,
}

impl RespondToTicketTool {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for RespondToTicketTool {
    fn name(&self) -> &str {
        "respond_to_ticket"
    }

    fn description(&self) -> &str {
        "Send a response on the current ticket to the other participants; set goal_met=true if you are the responder and the goal is satisfied"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {"type": "string"},
                "goal_met": {"type": "boolean", "description": "Responders only: signals the ticket's goal is satisfied"}
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>, ctx: &TurnContext) -> anyhow::Result<String> {
        let ticket_id = current_ticket_id(ctx)?.to_string();
        let message = require_string(&params, "message")?;
        let goal_met = optional_bool(&params, "goal_met");

        let ticket = self.registry.get_ticket(&ticket_id).await?;

        if ticket.status == TicketStatus::Closed {
            ctx.mark_responded();
            return Ok("This ticket is closed; your response was not delivered.".to_string());
        }

        if goal_met && ticket.created_by == ctx.agent_id {
            anyhow::bail!("goal_met is a responders-only signal; the creator cannot set it");
        }

        let recipients: Vec<String> = ticket
            .participants()
            .into_iter()
            .filter(|id| id != &ctx.agent_id)
            .collect();

        let outgoing = TicketMessage::new(ctx.agent_id.clone(), recipients, message, ticket_id.clone());
        ctx.defer_message(outgoing);
        ctx.mark_responded();

        match ticket.status {
            TicketStatus::Open if goal_met => {
                self.registry.store().update_status(&ticket_id, TicketStatus::AwaitingClose).await?;
            }
            TicketStatus::AwaitingClose if ticket.created_by == ctx.agent_id => {
                self.registry.store().update_status(&ticket_id, TicketStatus::Open).await?;
            }
            _ => {}
        }

        Ok("Response queued for delivery.".to_string())
    }
}

// ─────────────────────────────────────────────
// close_ticket
// ─────────────────────────────────────────────

/// Only the creator may close; fails if any sub-ticket is still open or
/// awaiting close.
pub struct CloseTicketTool {
    registry: Arc<Registry>,
}

impl CloseTicketTool {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for CloseTicketTool {
    fn name(&self) -> &str {
        "close_ticket"
    }

    fn description(&self) -> &str {
        "Close a ticket with a summary. Only the ticket's creator may do this, and only once every sub-ticket has closed."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ticket_id": {"type": "string"},
                "summary": {"type": "string"}
            },
            "required": ["ticket_id", "summary"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>, ctx: &TurnContext) -> anyhow::Result<String> {
        let ticket_id = require_string(&params, "ticket_id")?;
        let summary = require_string(&params, "summary")?;

        let ticket = self.registry.get_ticket(&ticket_id).await?;
        if ticket.created_by != ctx.agent_id {
            return Ok(format!(
                "Only the creator ({}) may close ticket '{}'. Use respond_to_ticket instead.",
                ticket.created_by, ticket.title
            ));
        }

        let open_children = self
            .registry
            .list_tickets(&TicketFilter {
                parent_id: Some(ticket_id.clone()),
                status: Some(TicketStatus::Open),
                ..Default::default()
            })
            .await?;
        let awaiting_children = self
            .registry
            .list_tickets(&TicketFilter {
                parent_id: Some(ticket_id.clone()),
                status: Some(TicketStatus::AwaitingClose),
                ..Default::default()
            })
            .await?;
        let unclosed: Vec<&Ticket> = open_children.iter().chain(awaiting_children.iter()).collect();
        if !unclosed.is_empty() {
            let names: Vec<&str> = unclosed.iter().map(|t| t.title.as_str()).collect();
            anyhow::bail!(
                "cannot close: {} sub-ticket(s) still unresolved ({}) — use `wait` and let them close first",
                unclosed.len(),
                names.join(", ")
            );
        }

        self.registry.close_ticket(&ticket_id, &summary).await?;
        Ok(format!("Ticket '{}' closed.", ticket.title))
    }
}

// ─────────────────────────────────────────────
// wait
// ─────────────────────────────────────────────

/// Marks the turn as responded without sending anything; the agent goes
/// idle until a future inbox message (typically a sub-ticket relay) wakes it.
pub struct WaitTool;

#[async_trait]
impl Tool for WaitTool {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Suspend auto-response on this turn; stay idle until a new inbox message wakes you"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    async fn execute(&self, _params: HashMap<String, Value>, ctx: &TurnContext) -> anyhow::Result<String> {
        ctx.mark_responded();
        Ok("Waiting for further updates on this ticket.".to_string())
    }
}

// ─────────────────────────────────────────────
// search_tickets
// ─────────────────────────────────────────────

pub struct SearchTicketsTool {
    registry: Arc<Registry>,
}

impl SearchTicketsTool {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

fn parse_status(s: &str) -> Option<TicketStatus> {
    match s {
        "open" => Some(TicketStatus::Open),
        "awaiting_close" => Some(TicketStatus::AwaitingClose),
        "closed" => Some(TicketStatus::Closed),
        _ => None,
    }
}

#[async_trait]
impl Tool for SearchTicketsTool {
    fn name(&self) -> &str {
        "search_tickets"
    }

    fn description(&self) -> &str {
        "Search tickets by free-text query, status, or participant"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "status": {"type": "string", "enum": ["open", "awaiting_close", "closed"]},
                "participant": {"type": "string"},
                "limit": {"type": "integer", "default": 20}
            },
            "required": []
        })
    }

    async fn execute(&self, params: HashMap<String, Value>, _ctx: &TurnContext) -> anyhow::Result<String> {
        let query = optional_string(&params, "query");
        let status = optional_string(&params, "status").and_then(|s| parse_status(&s));
        let participant = optional_string(&params, "participant");
        let limit = optional_i64(&params, "limit").map(|n| n.max(0) as usize).unwrap_or(20);

        let filter = TicketFilter {
            status,
            participant,
            query,
            limit: Some(limit),
            ..Default::default()
        };

        let total = self.registry.count_tickets(&filter).await?;
        let tickets = self.registry.list_tickets(&filter).await?;

        if tickets.is_empty() {
            return Ok("No tickets matched.".to_string());
        }

        let mut out = format!("{total} ticket(s) matched, showing {}:\n", tickets.len());
        for t in &tickets {
            out.push_str(&format!(
                "- {} [{:?}] \"{}\" (by {}, {} messages)\n",
                t.id,
                t.status,
                t.title,
                t.created_by,
                t.messages.len()
            ));
        }
        Ok(out)
    }
}

// ─────────────────────────────────────────────
// get_ticket
// ─────────────────────────────────────────────

pub struct GetTicketTool {
    registry: Arc<Registry>,
}

impl GetTicketTool {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for GetTicketTool {
    fn name(&self) -> &str {
        "get_ticket"
    }

    fn description(&self) -> &str {
        "Fetch a ticket, including its full message history, as JSON"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"ticket_id": {"type": "string"}},
            "required": ["ticket_id"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>, _ctx: &TurnContext) -> anyhow::Result<String> {
        let ticket_id = require_string(&params, "ticket_id")?;
        let ticket = self.registry.get_ticket(&ticket_id).await?;
        Ok(serde_json::to_string_pretty(&ticket)?)
    }
}
