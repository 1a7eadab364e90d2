//! The Ticket and Message domain model — the atomic work-unit and its
//! append-only conversation history.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved sink name for session managers bridging external chat platforms.
pub const EXTERNAL_SINK: &str = "_external";

/// Reserved sender used for automatic relay messages synthesized by the Registry.
pub const SYSTEM_SENDER: &str = "_system";

/// Generate an opaque id: 16 lowercase hex chars mixing a nanosecond
/// timestamp with a process-wide counter, wide enough to avoid collisions
/// across a long-running broker process.
pub fn generate_id() -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mixed = nanos.wrapping_mul(6364136223846793005).wrapping_add(count as u64);
    format!("{:08x}{:08x}", (mixed >> 32) as u32, mixed as u32)
}

/// Lifecycle status of a ticket.
///
/// Transitions obey `open -> awaiting_close -> {open | closed}` and
/// `open -> closed`. Once `closed`, only message appends are permitted.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    AwaitingClose,
    Closed,
}

impl TicketStatus {
    pub fn is_closed(self) -> bool {
        matches!(self, TicketStatus::Closed)
    }
}

/// One appended entry in a ticket's conversation history.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TicketMessage {
    pub id: String,
    /// Agent id or a reserved sender (`_system`).
    pub from: String,
    /// Agent ids or reserved sinks (`_external`).
    pub to: Vec<String>,
    pub content: String,
    pub ticket_id: String,
    pub timestamp: DateTime<Utc>,
}

impl TicketMessage {
    pub fn new(
        from: impl Into<String>,
        to: Vec<String>,
        content: impl Into<String>,
        ticket_id: impl Into<String>,
    ) -> Self {
        TicketMessage {
            id: generate_id(),
            from: from.into(),
            to,
            content: content.into(),
            ticket_id: ticket_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The atomic unit of work routed through the broker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub title: String,
    /// Completion condition, as free text.
    pub goal: String,
    pub status: TicketStatus,
    pub created_by: String,
    /// Ordered; duplicates allowed.
    pub waiting_on: Vec<String>,
    pub tags: BTreeSet<String>,
    /// Empty string means no parent.
    #[serde(default)]
    pub parent_id: String,
    /// Empty until close.
    #[serde(default)]
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Ordered, append-only.
    pub messages: Vec<TicketMessage>,
}

impl Ticket {
    /// Construct a fresh open ticket. `CreateTicket` is the only caller —
    /// it does not send the initial message itself (see Registry).
    pub fn new(
        created_by: impl Into<String>,
        title: impl Into<String>,
        goal: impl Into<String>,
        parent_id: impl Into<String>,
        waiting_on: Vec<String>,
        tags: BTreeSet<String>,
    ) -> Self {
        Ticket {
            id: generate_id(),
            title: title.into(),
            goal: goal.into(),
            status: TicketStatus::Open,
            created_by: created_by.into(),
            waiting_on,
            tags,
            parent_id: parent_id.into(),
            summary: String::new(),
            created_at: Utc::now(),
            closed_at: None,
            messages: Vec::new(),
        }
    }

    /// Every agent id with a stake in this ticket: the creator plus every
    /// waiter, deduplicated but order-preserving from `created_by` first.
    pub fn participants(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for id in std::iter::once(self.created_by.clone()).chain(self.waiting_on.iter().cloned()) {
            if seen.insert(id.clone()) {
                out.push(id);
            }
        }
        out
    }

    pub fn has_parent(&self) -> bool {
        !self.parent_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ticket_is_open_with_no_summary() {
        let t = Ticket::new("agent-a", "t", "g", "", vec!["agent-b".into()], BTreeSet::new());
        assert_eq!(t.status, TicketStatus::Open);
        assert!(t.summary.is_empty());
        assert!(t.closed_at.is_none());
        assert!(!t.has_parent());
    }

    #[test]
    fn participants_dedups_and_orders_creator_first() {
        let t = Ticket::new(
            "agent-a",
            "t",
            "g",
            "",
            vec!["agent-b".into(), "agent-a".into(), "agent-b".into()],
            BTreeSet::new(),
        );
        assert_eq!(t.participants(), vec!["agent-a".to_string(), "agent-b".to_string()]);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ticket_message_carries_ticket_id() {
        let m = TicketMessage::new("agent-a", vec!["agent-b".into()], "hello", "tkt-1");
        assert_eq!(m.ticket_id, "tkt-1");
        assert_eq!(m.from, "agent-a");
    }
}
