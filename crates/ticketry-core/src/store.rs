//! The `TicketStore` contract and two reference implementations.
//!
//! `InMemoryStore` is the primary implementation used by tests and the
//! default run mode. `JsonlStore` demonstrates the trait is satisfiable by a
//! durable-on-disk backend, directly grounded on the JSONL session
//! persistence convention this workspace already uses elsewhere — any
//! concurrent-safe store (including a real SQL engine) is equally valid.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{BrokerError, BrokerResult};
use crate::ticket::{Ticket, TicketMessage, TicketStatus};
use crate::utils;

/// Filter criteria for `List`/`Count`. All present fields must match
/// (conjunctive); `None` means "don't filter on this field".
#[derive(Clone, Debug, Default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    /// Matches `created_by` or a member of `waiting_on`.
    pub participant: Option<String>,
    /// Every tag here must be present on the ticket.
    pub tags: Vec<String>,
    /// Case-insensitive substring match against title + summary.
    pub query: Option<String>,
    pub parent_id: Option<String>,
    pub limit: Option<usize>,
}

impl TicketFilter {
    fn matches(&self, t: &Ticket) -> bool {
        if let Some(status) = self.status {
            if t.status != status {
                return false;
            }
        }
        if let Some(ref p) = self.participant {
            if t.created_by != *p && !t.waiting_on.iter().any(|w| w == p) {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().all(|tag| t.tags.contains(tag)) {
            return false;
        }
        if let Some(ref q) = self.query {
            let q = q.to_lowercase();
            let haystack = format!("{} {}", t.title, t.summary).to_lowercase();
            if !haystack.contains(&q) {
                return false;
            }
        }
        if let Some(ref parent) = self.parent_id {
            if t.parent_id != *parent {
                return false;
            }
        }
        true
    }
}

/// Persistence contract the Registry consumes. Any concurrent-safe
/// implementation satisfies it.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Upsert by id; mutates all non-id fields; atomic w.r.t. concurrent reads.
    async fn save(&self, ticket: Ticket) -> BrokerResult<()>;

    /// Returns the full ticket with all messages in append order.
    async fn get(&self, id: &str) -> BrokerResult<Ticket>;

    /// Returns tickets matching every filter criterion, newest-first by `created_at`.
    async fn list(&self, filter: &TicketFilter) -> BrokerResult<Vec<Ticket>>;

    /// Same filter semantics as `list`, ignoring `limit`.
    async fn count(&self, filter: &TicketFilter) -> BrokerResult<usize>;

    /// Atomically appends; idempotent if `msg.id` duplicates an existing message.
    async fn append_message(&self, ticket_id: &str, msg: TicketMessage) -> BrokerResult<()>;

    /// Fails if `id` is missing. Does not touch `summary` or `closed_at`.
    async fn update_status(&self, id: &str, status: TicketStatus) -> BrokerResult<()>;

    /// Atomic: sets `status=closed`, sets `summary`, sets `closed_at=now`.
    async fn close(&self, id: &str, summary: &str) -> BrokerResult<()>;
}

// ─────────────────────────────────────────────
// InMemoryStore
// ─────────────────────────────────────────────

/// `RwLock`-guarded in-memory map, mirroring the concurrency shape of a
/// cache-backed session manager: multiple readers, one exclusive writer.
pub struct InMemoryStore {
    tickets: RwLock<HashMap<String, Ticket>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            tickets: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TicketStore for InMemoryStore {
    async fn save(&self, ticket: Ticket) -> BrokerResult<()> {
        let mut tickets = self.tickets.write().unwrap();
        tickets.insert(ticket.id.clone(), ticket);
        Ok(())
    }

    async fn get(&self, id: &str) -> BrokerResult<Ticket> {
        let tickets = self.tickets.read().unwrap();
        tickets
            .get(id)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(format!("ticket {id}")))
    }

    async fn list(&self, filter: &TicketFilter) -> BrokerResult<Vec<Ticket>> {
        let tickets = self.tickets.read().unwrap();
        let mut matched: Vec<Ticket> = tickets.values().filter(|t| filter.matches(t)).cloned().collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn count(&self, filter: &TicketFilter) -> BrokerResult<usize> {
        let tickets = self.tickets.read().unwrap();
        Ok(tickets.values().filter(|t| filter.matches(t)).count())
    }

    async fn append_message(&self, ticket_id: &str, msg: TicketMessage) -> BrokerResult<()> {
        let mut tickets = self.tickets.write().unwrap();
        let ticket = tickets
            .get_mut(ticket_id)
            .ok_or_else(|| BrokerError::NotFound(format!("ticket {ticket_id}")))?;
        if ticket.messages.iter().any(|m| m.id == msg.id) {
            return Ok(());
        }
        ticket.messages.push(msg);
        Ok(())
    }

    async fn update_status(&self, id: &str, status: TicketStatus) -> BrokerResult<()> {
        let mut tickets = self.tickets.write().unwrap();
        let ticket = tickets
            .get_mut(id)
            .ok_or_else(|| BrokerError::NotFound(format!("ticket {id}")))?;
        ticket.status = status;
        Ok(())
    }

    async fn close(&self, id: &str, summary: &str) -> BrokerResult<()> {
        let mut tickets = self.tickets.write().unwrap();
        let ticket = tickets
            .get_mut(id)
            .ok_or_else(|| BrokerError::NotFound(format!("ticket {id}")))?;
        ticket.status = TicketStatus::Closed;
        ticket.summary = summary.to_string();
        ticket.closed_at = Some(chrono::Utc::now());
        Ok(())
    }
}

// ─────────────────────────────────────────────
// JsonlStore
// ─────────────────────────────────────────────

/// Durable on-disk store: one JSONL file per ticket under a data directory.
/// Line 1 is the ticket metadata (all fields except `messages`); each
/// subsequent line is one `TicketMessage`. An in-memory `RwLock` cache
/// mirrors `InMemoryStore`'s shape and is the source of truth for reads;
/// every mutation is written through to disk before the cache is updated.
pub struct JsonlStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Ticket>>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct TicketMetadata {
    #[serde(rename = "_type")]
    record_type: String,
    id: String,
    title: String,
    goal: String,
    status: TicketStatus,
    created_by: String,
    waiting_on: Vec<String>,
    tags: std::collections::BTreeSet<String>,
    parent_id: String,
    summary: String,
    created_at: chrono::DateTime<chrono::Utc>,
    closed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl JsonlStore {
    pub fn new(dir: Option<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.unwrap_or_else(utils::get_tickets_path);
        std::fs::create_dir_all(&dir)?;
        let mut cache = HashMap::new();
        for entry in std::fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "jsonl") {
                continue;
            }
            if let Some(ticket) = Self::load_from_disk(&path) {
                cache.insert(ticket.id.clone(), ticket);
            }
        }
        Ok(JsonlStore {
            dir,
            cache: RwLock::new(cache),
        })
    }

    fn ticket_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", utils::safe_filename(id)))
    }

    fn load_from_disk(path: &PathBuf) -> Option<Ticket> {
        let file = std::fs::File::open(path).ok()?;
        let reader = std::io::BufReader::new(file);
        let mut meta: Option<TicketMetadata> = None;
        let mut messages = Vec::new();

        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => continue,
            };
            if line.trim().is_empty() {
                continue;
            }
            if meta.is_none() {
                match serde_json::from_str::<TicketMetadata>(&line) {
                    Ok(m) => {
                        meta = Some(m);
                        continue;
                    }
                    Err(_) => continue,
                }
            }
            if let Ok(msg) = serde_json::from_str::<TicketMessage>(&line) {
                messages.push(msg);
            }
        }

        meta.map(|m| Ticket {
            id: m.id,
            title: m.title,
            goal: m.goal,
            status: m.status,
            created_by: m.created_by,
            waiting_on: m.waiting_on,
            tags: m.tags,
            parent_id: m.parent_id,
            summary: m.summary,
            created_at: m.created_at,
            closed_at: m.closed_at,
            messages,
        })
    }

    fn save_to_disk(&self, ticket: &Ticket) -> std::io::Result<()> {
        let path = self.ticket_path(&ticket.id);
        let mut file = std::fs::File::create(&path)?;

        let meta = TicketMetadata {
            record_type: "metadata".to_string(),
            id: ticket.id.clone(),
            title: ticket.title.clone(),
            goal: ticket.goal.clone(),
            status: ticket.status,
            created_by: ticket.created_by.clone(),
            waiting_on: ticket.waiting_on.clone(),
            tags: ticket.tags.clone(),
            parent_id: ticket.parent_id.clone(),
            summary: ticket.summary.clone(),
            created_at: ticket.created_at,
            closed_at: ticket.closed_at,
        };
        writeln!(file, "{}", serde_json::to_string(&meta)?)?;
        for msg in &ticket.messages {
            writeln!(file, "{}", serde_json::to_string(msg)?)?;
        }
        debug!(ticket = %ticket.id, messages = ticket.messages.len(), "persisted ticket to disk");
        Ok(())
    }
}

#[async_trait]
impl TicketStore for JsonlStore {
    async fn save(&self, ticket: Ticket) -> BrokerResult<()> {
        if let Err(e) = self.save_to_disk(&ticket) {
            return Err(BrokerError::Internal(format!("jsonl write failed: {e}")));
        }
        let mut cache = self.cache.write().unwrap();
        cache.insert(ticket.id.clone(), ticket);
        Ok(())
    }

    async fn get(&self, id: &str) -> BrokerResult<Ticket> {
        let cache = self.cache.read().unwrap();
        cache
            .get(id)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(format!("ticket {id}")))
    }

    async fn list(&self, filter: &TicketFilter) -> BrokerResult<Vec<Ticket>> {
        let cache = self.cache.read().unwrap();
        let mut matched: Vec<Ticket> = cache.values().filter(|t| filter.matches(t)).cloned().collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn count(&self, filter: &TicketFilter) -> BrokerResult<usize> {
        let cache = self.cache.read().unwrap();
        Ok(cache.values().filter(|t| filter.matches(t)).count())
    }

    async fn append_message(&self, ticket_id: &str, msg: TicketMessage) -> BrokerResult<()> {
        let ticket = {
            let mut cache = self.cache.write().unwrap();
            let ticket = cache
                .get_mut(ticket_id)
                .ok_or_else(|| BrokerError::NotFound(format!("ticket {ticket_id}")))?;
            if ticket.messages.iter().any(|m| m.id == msg.id) {
                return Ok(());
            }
            ticket.messages.push(msg);
            ticket.clone()
        };
        if let Err(e) = self.save_to_disk(&ticket) {
            warn!(ticket = %ticket_id, error = %e, "failed to persist appended message");
            return Err(BrokerError::Internal(format!("jsonl write failed: {e}")));
        }
        Ok(())
    }

    async fn update_status(&self, id: &str, status: TicketStatus) -> BrokerResult<()> {
        let ticket = {
            let mut cache = self.cache.write().unwrap();
            let ticket = cache
                .get_mut(id)
                .ok_or_else(|| BrokerError::NotFound(format!("ticket {id}")))?;
            ticket.status = status;
            ticket.clone()
        };
        if let Err(e) = self.save_to_disk(&ticket) {
            return Err(BrokerError::Internal(format!("jsonl write failed: {e}")));
        }
        Ok(())
    }

    async fn close(&self, id: &str, summary: &str) -> BrokerResult<()> {
        let ticket = {
            let mut cache = self.cache.write().unwrap();
            let ticket = cache
                .get_mut(id)
                .ok_or_else(|| BrokerError::NotFound(format!("ticket {id}")))?;
            ticket.status = TicketStatus::Closed;
            ticket.summary = summary.to_string();
            ticket.closed_at = Some(chrono::Utc::now());
            ticket.clone()
        };
        if let Err(e) = self.save_to_disk(&ticket) {
            return Err(BrokerError::Internal(format!("jsonl write failed: {e}")));
        }
        Ok(())
    }
}
