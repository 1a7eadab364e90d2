//! Shared agent/worker construction, used by both `serve` and `send`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use ticketry_agent::tools::filesystem::{EditFileTool, ListDirTool, ReadFileTool, WriteFileTool};
use ticketry_agent::tools::shell::ExecTool;
use ticketry_agent::tools::ticket::{
    CloseTicketTool, CreateTicketTool, GetTicketTool, RespondToTicketTool, SearchTicketsTool, WaitTool,
};
use ticketry_agent::tools::web::{WebFetchTool, WebSearchTool};
use ticketry_agent::tools::{Tool, ToolRegistry};
use ticketry_agent::{Agent, Worker};
use ticketry_core::agent_spec::{AgentSpec, ToolGate};
use ticketry_core::config::schema::{AgentEntry, Config};
use ticketry_core::memory::FileScopedMemory;
use ticketry_core::registry::Registry;
use ticketry_providers::http_provider::create_provider;
use ticketry_providers::traits::{LlmProvider, LlmRequestConfig};

/// Build a fully wired `Worker` for one configured agent: resolves its
/// provider, assembles its gated tool pool, and loads its scoped memory.
pub fn build_worker(entry: &AgentEntry, config: &Config, workspace: &Path, registry: Arc<Registry>) -> Result<Worker> {
    let providers_map = config.providers.to_map();
    let http_provider = create_provider(&entry.provider_selector, &providers_map).map_err(|e| anyhow::anyhow!(e))?;
    let model = http_provider.default_model().to_string();
    let provider: Arc<dyn LlmProvider> = Arc::new(http_provider);

    let gate = ToolGate {
        whitelist: entry.tool_whitelist.clone(),
        blacklist: entry.tool_blacklist.clone(),
    };
    let tools = build_tool_registry(&gate, &registry, config, workspace);

    let agent = Agent::new(provider, model, tools, entry.max_iterations).with_request_config(LlmRequestConfig {
        max_tokens: entry.max_tokens,
        temperature: entry.temperature,
    });

    let spec = AgentSpec {
        id: entry.id.clone(),
        role: entry.role.clone(),
        core_instructions: entry.core_instructions.clone(),
        tool_gate: gate,
        provider_selector: Some(entry.provider_selector.clone()),
        workspace: workspace.to_path_buf(),
        max_iterations: entry.max_iterations,
    };

    let memory = FileScopedMemory::new(workspace).context("failed to create agent memory directory")?;

    Ok(Worker::new(spec, agent, registry)
        .with_memory(Arc::new(memory))
        .with_max_retries(config.broker.max_retries as usize)
        .with_retry_delay(Duration::from_secs(config.broker.retry_delay_secs)))
}

/// Build the full available tool pool (six ticket tools plus the ambient
/// filesystem/shell/web tools), then narrow it through the agent's gate.
pub fn build_tool_registry(gate: &ToolGate, registry: &Arc<Registry>, config: &Config, workspace: &Path) -> ToolRegistry {
    let pool: Vec<(String, Arc<dyn Tool>)> = vec![
        ("create_ticket".to_string(), Arc::new(CreateTicketTool::new(registry.clone()))),
        ("respond_to_ticket".to_string(), Arc::new(RespondToTicketTool::new(registry.clone()))),
        ("close_ticket".to_string(), Arc::new(CloseTicketTool::new(registry.clone()))),
        ("wait".to_string(), Arc::new(WaitTool)),
        ("search_tickets".to_string(), Arc::new(SearchTicketsTool::new(registry.clone()))),
        ("get_ticket".to_string(), Arc::new(GetTicketTool::new(registry.clone()))),
        ("read_file".to_string(), Arc::new(ReadFileTool::new(restricted_dir(config, workspace)))),
        ("write_file".to_string(), Arc::new(WriteFileTool::new(restricted_dir(config, workspace)))),
        ("edit_file".to_string(), Arc::new(EditFileTool::new(restricted_dir(config, workspace)))),
        ("list_dir".to_string(), Arc::new(ListDirTool::new(restricted_dir(config, workspace)))),
        (
            "exec".to_string(),
            Arc::new(ExecTool::new(
                workspace.to_path_buf(),
                Some(config.tools.exec.timeout),
                config.tools.restrict_to_workspace,
            )),
        ),
        (
            "web_search".to_string(),
            Arc::new(WebSearchTool::new(non_empty(&config.tools.web.search.api_key))),
        ),
        ("web_fetch".to_string(), Arc::new(WebFetchTool::new())),
    ];

    let names: Vec<String> = pool.iter().map(|(name, _)| name.clone()).collect();
    let allowed = gate.filter(&names);

    let mut registry = ToolRegistry::new();
    for (name, tool) in pool {
        if allowed.contains(&name) {
            registry.register(tool);
        }
    }
    registry
}

fn restricted_dir(config: &Config, workspace: &Path) -> Option<std::path::PathBuf> {
    if config.tools.restrict_to_workspace {
        Some(workspace.to_path_buf())
    } else {
        None
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
