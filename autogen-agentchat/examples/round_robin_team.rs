//! Round-robin team example
//!
//! Two participants share a conversation: a researcher that calls a unit
//! conversion tool and a reviewer that ends the session. The model client
//! is a small rule-based stand-in so the example runs offline.

use async_trait::async_trait;
use autogen_agentchat::models::FunctionCall;
use autogen_agentchat::tools::ToolSpec;
use autogen_agentchat::*;
use serde_json::json;
use std::sync::Arc;

const TEAM: &str = r#"
name = "conversion-desk"

[termination]
type = "any_of"
conditions = [
    { type = "text_mention", text = "APPROVED" },
    { type = "max_turns", max_turns = 6 },
]

[[participants]]
id = "researcher"
system_prompt = "You answer unit conversion questions using tools."
tool_allow_list = ["celsius_to_fahrenheit"]

[[participants]]
id = "reviewer"
system_prompt = "You check the researcher's answer and reply APPROVED when it is right."
"#;

/// Calls the conversion tool once, then reports its result
struct RuleBasedClient;

#[async_trait]
impl ChatCompletionClient for RuleBasedClient {
    async fn create(
        &self,
        messages: &[LlmMessage],
        tools: &[ToolSpec],
        _config: &ModelConfig,
        _cancellation_token: &CancellationToken,
    ) -> autogen_agentchat::Result<CreateResult> {
        if let Some(LlmMessage::FunctionResult { content, .. }) = messages.last() {
            return Ok(CreateResult::text(format!("21.5 °C is {} °F.", content)));
        }
        if tools.iter().any(|t| t.name == "celsius_to_fahrenheit") {
            return Ok(CreateResult::function_calls(vec![FunctionCall {
                id: "call-1".to_string(),
                name: "celsius_to_fahrenheit".to_string(),
                arguments: json!({"celsius": "21.5"}).to_string(),
            }]));
        }
        Ok(CreateResult::text("The conversion checks out. APPROVED"))
    }

    fn model_name(&self) -> &str {
        "rule-based"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AgentChatConfig::default();
    init_tracing(&config.logging);

    let registry = Arc::new(ToolRegistry::new());
    registry.register(
        ToolDescriptor::builder("celsius_to_fahrenheit")
            .description("Convert a temperature from Celsius to Fahrenheit")
            .param(ParameterSpec::required("celsius", ParamType::Number))
            .build(FunctionTool::new(|args, _ctx| async move {
                match args.get("celsius").and_then(|v| v.as_f64()) {
                    Some(c) => ToolOutcome::ok(json!(c * 9.0 / 5.0 + 32.0)),
                    None => ToolOutcome::error("validation", "celsius must be a number"),
                }
            }))?,
    )?;

    let coordinator = Arc::new(TeamCoordinator::new(
        ReasoningLoop::new(LoopContext::from_config(Arc::clone(&registry), &config)),
        Arc::new(InMemorySessionStore::new()),
        config.coordinator.clone(),
    ));
    let client: Arc<dyn ChatCompletionClient> = Arc::new(RuleBasedClient);
    let service = SessionService::new(
        Arc::clone(&coordinator),
        TeamDefinition::from_toml_str(TEAM)?,
        Arc::new(client),
        config.service.clone(),
    )?;

    let response = service
        .handle(AgentRequest::new("What is 21.5 °C in Fahrenheit?", "demo-user", "demo-session"))
        .await;
    println!("success: {}", response.success);
    println!("output:  {}", response.output);

    for turn in coordinator.transcript("demo-session").await? {
        println!(
            "#{} {:<10} tools={} {}",
            turn.sequence_number,
            turn.participant_id,
            turn.tool_calls.len(),
            turn.message
        );
    }
    println!("state:   {}", coordinator.session_state("demo-session").await?);
    Ok(())
}
