//! Agent Identity — the immutable record describing one registered agent.

use std::collections::BTreeSet;
use std::path::PathBuf;

/// Tool-name gating carried on an `AgentSpec`.
///
/// Semantics (enforced by `ticketry-agent::agent::Agent` at construction
/// time, not here): if `whitelist` is non-empty, only those names are
/// registered for this agent and `blacklist` is ignored; else `blacklist`
/// removes names from the full set; else every available tool is
/// registered. MCP-style prefixed tool names bypass the gate entirely.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolGate {
    pub whitelist: BTreeSet<String>,
    pub blacklist: BTreeSet<String>,
}

impl ToolGate {
    /// Apply this gate to a list of available tool names, returning the
    /// subset that should actually be registered.
    pub fn filter(&self, available: &[String]) -> Vec<String> {
        if !self.whitelist.is_empty() {
            available
                .iter()
                .filter(|name| self.whitelist.contains(*name))
                .cloned()
                .collect()
        } else if !self.blacklist.is_empty() {
            available
                .iter()
                .filter(|name| !self.blacklist.contains(*name))
                .cloned()
                .collect()
        } else {
            available.to_vec()
        }
    }
}

/// An immutable agent identity record, created at startup from configuration.
/// Dynamic create/destroy is optional and tracked via the Registry's
/// `creators` map rather than mutating this struct.
#[derive(Clone, Debug)]
pub struct AgentSpec {
    pub id: String,
    pub role: String,
    /// The agent's default system-prompt body.
    pub core_instructions: String,
    pub tool_gate: ToolGate,
    /// Model name or explicit provider name; `None` defers to process-wide default.
    pub provider_selector: Option<String>,
    pub workspace: PathBuf,
    /// Maximum ReAct loop iterations before failing (default 20; 15 for
    /// agents opting into a subagent-style lower bound).
    pub max_iterations: usize,
}

impl AgentSpec {
    pub fn new(id: impl Into<String>, role: impl Into<String>, core_instructions: impl Into<String>, workspace: PathBuf) -> Self {
        AgentSpec {
            id: id.into(),
            role: role.into(),
            core_instructions: core_instructions.into(),
            tool_gate: ToolGate::default(),
            provider_selector: None,
            workspace,
            max_iterations: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_wins_over_blacklist() {
        let gate = ToolGate {
            whitelist: ["read_file".to_string()].into_iter().collect(),
            blacklist: ["read_file".to_string()].into_iter().collect(),
        };
        let available = vec!["read_file".to_string(), "write_file".to_string()];
        assert_eq!(gate.filter(&available), vec!["read_file".to_string()]);
    }

    #[test]
    fn blacklist_removes_when_whitelist_empty() {
        let gate = ToolGate {
            whitelist: BTreeSet::new(),
            blacklist: ["write_file".to_string()].into_iter().collect(),
        };
        let available = vec!["read_file".to_string(), "write_file".to_string()];
        assert_eq!(gate.filter(&available), vec!["read_file".to_string()]);
    }

    #[test]
    fn empty_gate_allows_everything() {
        let gate = ToolGate::default();
        let available = vec!["read_file".to_string(), "write_file".to_string()];
        assert_eq!(gate.filter(&available), available);
    }

    #[test]
    fn default_max_iterations_is_twenty() {
        let spec = AgentSpec::new("a", "role", "instructions", PathBuf::from("/tmp"));
        assert_eq!(spec.max_iterations, 20);
    }
}
