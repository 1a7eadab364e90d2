//! Tool modules available to an agent: the six ticket-protocol tools plus
//! an ambient pool of filesystem/shell/web tools gated per-agent by
//! `ToolGate`.

pub mod base;
pub mod registry;
pub mod filesystem;
pub mod shell;
pub mod ticket;
pub mod web;

pub use base::{Tool, require_string, optional_string, optional_i64, optional_bool};
pub use registry::ToolRegistry;
