//! Ticketry Core — ticket/agent domain types, the `TicketStore` contract
//! and reference implementations, the `Registry`, scoped memory, and
//! configuration.
//!
//! This crate has no knowledge of LLMs or the ReAct loop; `ticketry-agent`
//! and `ticketry-providers` build on top of it.

pub mod agent_spec;
pub mod config;
pub mod error;
pub mod memory;
pub mod registry;
pub mod store;
pub mod ticket;
pub mod types;
pub mod utils;

pub use agent_spec::{AgentSpec, ToolGate};
pub use error::{BrokerError, BrokerResult};
pub use memory::{FileScopedMemory, MemoryProvider};
pub use registry::{Registry, Sink, DEFAULT_INBOX_CAPACITY};
pub use store::{InMemoryStore, JsonlStore, TicketFilter, TicketStore};
pub use ticket::{generate_id, Ticket, TicketMessage, TicketStatus, EXTERNAL_SINK, SYSTEM_SENDER};
