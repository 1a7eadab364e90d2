//! The ReAct loop: alternates LLM calls with tool execution until the
//! model answers with plain text, a tool marks the turn as responded, or
//! the iteration bound is hit.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use ticketry_core::error::BrokerError;
use ticketry_core::types::Message;
use ticketry_providers::traits::{LlmProvider, LlmRequestConfig};
use tokio_util::sync::CancellationToken;

use crate::context::TurnContext;
use crate::tools::ToolRegistry;

/// Default iteration bound for an ordinary registered agent.
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Lower bound preserved for any agent spec that opts into a tighter cap
/// (mirrors the subagent-equivalent budget).
pub const SUBAGENT_MAX_ITERATIONS: usize = 15;

/// One agent's runtime: a bound provider/model pair, its gated tool set,
/// and the iteration cap from its `AgentSpec`.
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    model: String,
    tools: ToolRegistry,
    max_iterations: usize,
    request_config: LlmRequestConfig,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        tools: ToolRegistry,
        max_iterations: usize,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            tools,
            max_iterations,
            request_config: LlmRequestConfig::default(),
        }
    }

    pub fn with_request_config(mut self, config: LlmRequestConfig) -> Self {
        self.request_config = config;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run the ReAct loop starting from `ctx.input_messages`.
    ///
    /// Returns the assistant's final text. An empty string means a tool
    /// already dispatched the turn's response (see `TurnContext::mark_responded`)
    /// and no further text should be sent.
    pub async fn run(&self, ctx: &TurnContext, cancel: &CancellationToken) -> anyhow::Result<String> {
        let mut messages = ctx.input_messages.clone();

        for _ in 0..self.max_iterations {
            if cancel.is_cancelled() {
                anyhow::bail!("agent run cancelled");
            }

            let defs = self.tools.get_definitions();
            let tools_arg = if defs.is_empty() { None } else { Some(defs.as_slice()) };

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => anyhow::bail!("agent run cancelled"),
                r = self.provider.chat(&messages, tools_arg, &self.model, &self.request_config) => r,
            };

            // Transport/API failures surface as Unavailable so the Worker's
            // retry loop engages, rather than as a free-text answer the loop
            // would otherwise treat as the model's final response.
            let response = response.map_err(|e| BrokerError::Unavailable(e.to_string()))?;

            if response.has_tool_calls() {
                messages.push(Message::Assistant {
                    content: response.content.clone(),
                    tool_calls: Some(response.tool_calls.clone()),
                    reasoning_content: response.reasoning_content.clone(),
                });

                for call in &response.tool_calls {
                    let params: HashMap<String, Value> =
                        serde_json::from_str(&call.function.arguments).unwrap_or_default();
                    let result = self.tools.execute(&call.function.name, params, ctx).await;
                    messages.push(Message::tool_result(call.id.clone(), result));
                }

                if ctx.has_responded() {
                    return Ok(String::new());
                }
                continue;
            }

            return Ok(response.content.unwrap_or_default());
        }

        anyhow::bail!("exceeded max iterations ({})", self.max_iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use ticketry_core::types::{LlmResponse, ToolDefinition, ToolCall};

    /// Replays a fixed script of responses, one per call, and counts calls.
    struct ScriptedProvider {
        script: Mutex<Vec<LlmResponse>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<LlmResponse>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        fn with_delay(script: Vec<LlmResponse>, delay: Duration) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
                delay: Some(delay),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(
            &self,
            _messages: &[Message],
            _tools: Option<&[ToolDefinition]>,
            _model: &str,
            _config: &LlmRequestConfig,
        ) -> anyhow::Result<LlmResponse> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(LlmResponse::error("scripted responses exhausted"))
            } else {
                Ok(script.remove(0))
            }
        }

        fn default_model(&self) -> &str {
            "scripted"
        }

        fn display_name(&self) -> &str {
            "scripted"
        }
    }

    fn text_response(s: &str) -> LlmResponse {
        LlmResponse {
            content: Some(s.to_string()),
            ..Default::default()
        }
    }

    fn tool_call_response(name: &str, args: &str) -> LlmResponse {
        LlmResponse {
            content: None,
            tool_calls: vec![ToolCall::new("call-1", name, args)],
            ..Default::default()
        }
    }

    fn ctx() -> TurnContext {
        TurnContext::new("agent-a", "tkt1", vec![Message::user("hi")])
    }

    #[tokio::test]
    async fn direct_text_returns_immediately_after_one_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("hello there")]));
        let agent = Agent::new(provider.clone(), "m", ToolRegistry::new(), 20);
        let result = agent.run(&ctx(), &CancellationToken::new()).await.unwrap();
        assert_eq!(result, "hello there");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_call_survives_as_error_string_and_continues() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response("does_not_exist", "{}"),
            text_response("recovered"),
        ]));
        let agent = Agent::new(provider.clone(), "m", ToolRegistry::new(), 20);
        let result = agent.run(&ctx(), &CancellationToken::new()).await.unwrap();
        assert_eq!(result, "recovered");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn responded_short_circuits_without_another_provider_call() {
        use crate::tools::base::Tool;

        struct RespondTool;
        #[async_trait]
        impl Tool for RespondTool {
            fn name(&self) -> &str {
                "respond_to_ticket"
            }
            fn description(&self) -> &str {
                "test respond"
            }
            fn parameters(&self) -> Value {
                serde_json::json!({"type": "object", "properties": {}, "required": []})
            }
            async fn execute(&self, _params: HashMap<String, Value>, ctx: &TurnContext) -> anyhow::Result<String> {
                ctx.mark_responded();
                Ok("queued".to_string())
            }
        }

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(RespondTool));

        let provider = Arc::new(ScriptedProvider::new(vec![tool_call_response(
            "respond_to_ticket",
            "{}",
        )]));
        let agent = Agent::new(provider.clone(), "m", tools, 20);
        let result = agent.run(&ctx(), &CancellationToken::new()).await.unwrap();
        assert_eq!(result, "");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn exceeding_max_iterations_is_an_error() {
        let script: Vec<LlmResponse> = (0..5).map(|_| tool_call_response("noop", "{}")).collect();
        let provider = Arc::new(ScriptedProvider::new(script));
        let agent = Agent::new(provider.clone(), "m", ToolRegistry::new(), 3);
        let err = agent.run(&ctx(), &CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("exceeded max iterations"));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn provider_error_surfaces_as_unavailable_not_free_text() {
        struct FailingProvider;

        #[async_trait]
        impl LlmProvider for FailingProvider {
            async fn chat(
                &self,
                _messages: &[Message],
                _tools: Option<&[ToolDefinition]>,
                _model: &str,
                _config: &LlmRequestConfig,
            ) -> anyhow::Result<LlmResponse> {
                Err(anyhow::anyhow!("Error calling LLM: 429 rate limited"))
            }

            fn default_model(&self) -> &str {
                "failing"
            }

            fn display_name(&self) -> &str {
                "failing"
            }
        }

        let agent = Agent::new(Arc::new(FailingProvider), "m", ToolRegistry::new(), 20);
        let err = agent.run(&ctx(), &CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("unavailable"));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn cancellation_stops_loop_within_bounded_wall_time() {
        let script: Vec<LlmResponse> = (0..20).map(|_| tool_call_response("noop", "{}")).collect();
        let provider = Arc::new(ScriptedProvider::with_delay(script, Duration::from_secs(5)));
        let agent = Agent::new(provider.clone(), "m", ToolRegistry::new(), 20);
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });

        let start = std::time::Instant::now();
        let err = agent.run(&ctx(), &cancel).await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn tool_gating_only_registers_whitelisted_tool() {
        use crate::tools::base::Tool;
        use ticketry_core::ToolGate;

        struct AllowedTool;
        #[async_trait]
        impl Tool for AllowedTool {
            fn name(&self) -> &str {
                "read_file"
            }
            fn description(&self) -> &str {
                "read"
            }
            fn parameters(&self) -> Value {
                serde_json::json!({"type": "object", "properties": {}, "required": []})
            }
            async fn execute(&self, _params: HashMap<String, Value>, _ctx: &TurnContext) -> anyhow::Result<String> {
                Ok("ok".to_string())
            }
        }
        struct BlockedTool;
        #[async_trait]
        impl Tool for BlockedTool {
            fn name(&self) -> &str {
                "write_file"
            }
            fn description(&self) -> &str {
                "write"
            }
            fn parameters(&self) -> Value {
                serde_json::json!({"type": "object", "properties": {}, "required": []})
            }
            async fn execute(&self, _params: HashMap<String, Value>, _ctx: &TurnContext) -> anyhow::Result<String> {
                Ok("ok".to_string())
            }
        }

        let available = vec!["read_file".to_string(), "write_file".to_string()];
        let gate = ToolGate {
            whitelist: ["read_file".to_string()].into_iter().collect(),
            blacklist: Default::default(),
        };
        let allowed_names = gate.filter(&available);

        let mut tools = ToolRegistry::new();
        if allowed_names.contains(&"read_file".to_string()) {
            tools.register(Arc::new(AllowedTool));
        }
        if allowed_names.contains(&"write_file".to_string()) {
            tools.register(Arc::new(BlockedTool));
        }

        assert!(tools.has("read_file"));
        assert!(!tools.has("write_file"));

        let provider = Arc::new(ScriptedProvider::new(vec![text_response("done")]));
        let agent = Agent::new(provider, "m", tools, 20);
        let result = agent.run(&ctx(), &CancellationToken::new()).await.unwrap();
        assert_eq!(result, "done");
    }
}
