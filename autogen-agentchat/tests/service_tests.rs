//! Request/response service tests

mod test_utils;

use autogen_agentchat::*;
use serde_json::json;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use test_utils::*;

const TEAM: &str = r#"
name = "calculator"

[termination]
type = "any_of"
conditions = [
    { type = "text_mention", text = "TERMINATE" },
    { type = "max_turns", max_turns = 10 },
]

[[participants]]
id = "assistant"
system_prompt = "You compute things with tools."
tool_allow_list = ["square"]
"#;

fn service(client: Arc<ScriptedClient>, max_advances_per_request: usize) -> SessionService {
    let registry = registry_with(vec![square_tool(Arc::new(AtomicUsize::new(0)))]);
    let coordinator = Arc::new(coordinator_with(registry, LoopConfig::default()));
    let client: Arc<dyn ChatCompletionClient> = client;
    SessionService::new(
        coordinator,
        TeamDefinition::from_toml_str(TEAM).unwrap(),
        Arc::new(client),
        ServiceConfig {
            max_advances_per_request,
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_new_session_runs_to_completion() {
    let client = ScriptedClient::shared(vec![
        call("square", json!({"x": "7"})),
        say("The answer is 49. TERMINATE"),
    ]);
    let service = service(client.clone(), 10);

    let response = service
        .handle(AgentRequest::new("What is 7 squared?", "user-1", "calc-1"))
        .await;
    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.output, "The answer is 49. TERMINATE");
    let data = response.data.unwrap();
    assert_eq!(data["session_id"], "calc-1");
    assert_eq!(data["state"], "terminated");
    assert_eq!(data["turns"], 1);
    assert_eq!(data["tool_calls"], 1);

    // The query became the task
    assert!(texts(&client.seen()[0]).contains(&"What is 7 squared?".to_string()));

    let again = service.handle(AgentRequest::new("And 8?", "user-1", "calc-1")).await;
    assert!(!again.success);
    assert!(again.error.unwrap().contains("has ended"));
}

#[tokio::test]
async fn test_follow_up_reaches_active_session() {
    let client = ScriptedClient::shared(vec![say("Working on it"), say("Noted the follow-up")]);
    let service = service(client.clone(), 1);

    let first = service.handle(AgentRequest::new("Start", "user-1", "chat-1")).await;
    assert!(first.success);
    assert_eq!(first.data.as_ref().unwrap()["state"], "active");

    let second = service.handle(AgentRequest::new("Also do this", "user-1", "chat-1")).await;
    assert!(second.success);
    assert_eq!(second.output, "Noted the follow-up");
    let last_request = client.seen().last().cloned().unwrap();
    assert!(texts(&last_request).contains(&"Also do this".to_string()));

    let page = service
        .poll_transcript(&TranscriptQuery::new("chat-1").from_sequence(1))
        .await
        .unwrap();
    assert_eq!(page.state, SessionState::Active);
    assert_eq!(page.turns.len(), 1);
    assert_eq!(page.next_from, 2);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let service = service(ScriptedClient::shared(Vec::new()), 1);
    for request in [
        AgentRequest::new("", "user-1", "s1"),
        AgentRequest::new("hi", "  ", "s1"),
        AgentRequest::new("hi", "user-1", ""),
        AgentRequest::new("hi", "user-1", "../etc"),
    ] {
        let response = service.handle(request).await;
        assert!(!response.success);
        assert!(response.error.is_some());
        assert!(response.data.is_none());
    }
}

#[tokio::test]
async fn test_limitations_are_reported_not_failed() {
    let client = ScriptedClient::shared(vec![
        call("square", json!({"x": "seven"})),
        call("square", json!({"x": "seven"})),
        call("square", json!({"x": "seven"})),
    ]);
    let service = service(client, 1);

    let response = service.handle(AgentRequest::new("Square seven", "user-1", "s-limit")).await;
    assert!(response.success);
    let data = response.data.unwrap();
    assert_eq!(data["limitations"].as_array().unwrap().len(), 1);
    assert!(response.output.starts_with("I could not fully complete this request"));
}

#[tokio::test]
async fn test_cancelled_session_reports_failure() {
    let service = service(ScriptedClient::shared(Vec::new()), 1);
    assert!(service.handle(AgentRequest::new("Start", "user-1", "doomed")).await.success);

    service.coordinator().cancel("doomed").await.unwrap();
    let response = service.handle(AgentRequest::new("Continue", "user-1", "doomed")).await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("has ended"));
    assert_eq!(
        service.coordinator().session_state("doomed").await.unwrap(),
        SessionState::Failed
    );
}

#[test]
fn test_response_wire_shape() {
    let request: AgentRequest = serde_json::from_value(json!({
        "query": "hi",
        "user_id": "u",
        "session_id": "s",
        "request_id": "r-1",
    }))
    .unwrap();
    assert_eq!(request.request_id, "r-1");

    let response = AgentResponse::success("ok", json!({"turns": 1}));
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({"success": true, "output": "ok", "data": {"turns": 1}})
    );
}
