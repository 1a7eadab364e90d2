//! Ticketry Agent — the ReAct loop, the per-agent Worker, the ticket tool
//! protocol, and the system prompt assembler.
//!
//! This crate contains:
//! - **tools**: Tool trait, registry, and built-in tools (ticket protocol, filesystem, shell, web)
//! - **context**: The ambient `TurnContext` and system prompt assembly
//! - **agent**: The ReAct loop
//! - **worker**: Per-agent inbox consumer driving the Agent to completion

pub mod agent;
pub mod context;
pub mod tools;
pub mod worker;

pub use agent::{Agent, DEFAULT_MAX_ITERATIONS, SUBAGENT_MAX_ITERATIONS};
pub use context::{SystemPromptBuilder, TurnContext};
pub use tools::{Tool, ToolRegistry};
pub use worker::{Worker, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};
