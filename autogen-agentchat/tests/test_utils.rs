//! Test utilities and helpers for autogen-agentchat tests

#![allow(dead_code)]

use async_trait::async_trait;
use autogen_agentchat::models::FunctionCall;
use autogen_agentchat::tools::ToolSpec;
use autogen_agentchat::*;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted model reply
#[derive(Debug, Clone)]
pub enum Step {
    Text(String),
    Call { name: String, arguments: Value },
    Fail(String),
    /// Never answers; returns only once cancelled
    Hang,
}

pub fn say(text: &str) -> Step {
    Step::Text(text.to_string())
}

pub fn call(name: &str, arguments: Value) -> Step {
    Step::Call {
        name: name.to_string(),
        arguments,
    }
}

/// Model client replaying a fixed script; answers `fallback` once the script runs out
pub struct ScriptedClient {
    steps: Mutex<VecDeque<Step>>,
    fallback: String,
    seen: Mutex<Vec<Vec<LlmMessage>>>,
    offered: Mutex<Vec<Vec<String>>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(steps: Vec<Step>) -> Self {
        Self::with_fallback(steps, "done")
    }

    pub fn with_fallback(steps: Vec<Step>, fallback: &str) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            fallback: fallback.to_string(),
            seen: Mutex::new(Vec::new()),
            offered: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn shared(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self::new(steps))
    }

    /// Messages passed to every `create` call, in order
    pub fn seen(&self) -> Vec<Vec<LlmMessage>> {
        self.seen.lock().unwrap().clone()
    }

    /// Tool names offered on every `create` call
    pub fn offered(&self) -> Vec<Vec<String>> {
        self.offered.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatCompletionClient for ScriptedClient {
    async fn create(
        &self,
        messages: &[LlmMessage],
        tools: &[ToolSpec],
        _config: &ModelConfig,
        cancellation_token: &CancellationToken,
    ) -> Result<CreateResult> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());
        self.offered
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name.clone()).collect());

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Text(text)) => Ok(CreateResult::text(text)),
            Some(Step::Call { name, arguments }) => Ok(CreateResult::function_calls(vec![FunctionCall {
                id: format!("call-{}", index + 1),
                name,
                arguments: arguments.to_string(),
            }])),
            Some(Step::Fail(message)) => Err(AgentChatError::Model(message)),
            Some(Step::Hang) => {
                cancellation_token.wait_for_cancellation().await;
                Err(AgentChatError::Cancelled)
            }
            None => Ok(CreateResult::text(self.fallback.clone())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// `square(x: integer) -> x * x`, counting invocations
pub fn square_tool(invocations: Arc<AtomicUsize>) -> ToolDescriptor {
    ToolDescriptor::builder("square")
        .description("Square an integer")
        .param(ParameterSpec::required("x", ParamType::Integer).with_description("The number to square"))
        .build(FunctionTool::new(move |args, _ctx| {
            let invocations = Arc::clone(&invocations);
            async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                match args.get("x").and_then(Value::as_i64) {
                    Some(x) => ToolOutcome::ok(json!(x * x)),
                    None => ToolOutcome::error("validation", "x must be an integer"),
                }
            }
        }))
        .unwrap()
}

/// A tool that sleeps past any short timeout for its first `slow_calls` invocations
pub fn slow_then_fast_tool(name: &str, slow_calls: usize, invocations: Arc<AtomicUsize>) -> ToolDescriptor {
    ToolDescriptor::builder(name)
        .description("Eventually answers")
        .param(ParameterSpec::required("query", ParamType::String))
        .build(FunctionTool::new(move |_args, _ctx| {
            let invocations = Arc::clone(&invocations);
            async move {
                let n = invocations.fetch_add(1, Ordering::SeqCst);
                if n < slow_calls {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                ToolOutcome::ok(json!("sunny"))
            }
        }))
        .unwrap()
}

/// A tool that always reports the given error kind
pub fn failing_tool(name: &str, kind: &str) -> ToolDescriptor {
    let kind = kind.to_string();
    ToolDescriptor::builder(name)
        .description("Always fails")
        .build(FunctionTool::new(move |_args, _ctx| {
            let kind = kind.clone();
            async move { ToolOutcome::error(kind, "backend unavailable") }
        }))
        .unwrap()
}

/// Retry policy with millisecond delays so tests stay fast
pub fn fast_retry() -> RetryPolicyConfig {
    RetryPolicyConfig {
        initial_delay_ms: 1,
        max_delay_ms: 5,
        ..RetryPolicyConfig::default()
    }
}

pub fn registry_with(tools: Vec<ToolDescriptor>) -> Arc<ToolRegistry> {
    let registry = Arc::new(ToolRegistry::new());
    for tool in tools {
        registry.register(tool).unwrap();
    }
    registry
}

pub fn coordinator_with(registry: Arc<ToolRegistry>, loop_config: LoopConfig) -> TeamCoordinator {
    let context = LoopContext::new(registry)
        .with_policy(ErrorPolicy::new(fast_retry()))
        .with_loop_config(loop_config);
    TeamCoordinator::new(
        ReasoningLoop::new(context),
        Arc::new(InMemorySessionStore::new()),
        CoordinatorConfig::default(),
    )
}

pub fn participant(id: &str, tools: &[&str], client: Arc<dyn ChatCompletionClient>) -> Participant {
    Participant::new(
        ParticipantDefinition::new(id, format!("You are {}.", id)).with_tools(tools.iter().copied()),
        client,
    )
}

/// Text of every message, for loose assertions
pub fn texts(messages: &[LlmMessage]) -> Vec<String> {
    messages.iter().filter_map(|m| m.text().map(str::to_string)).collect()
}
