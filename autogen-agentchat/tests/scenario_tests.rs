//! End-to-end scenarios through the coordinator: argument coercion, retries
//! after timeouts, turn limits and allow-list enforcement.

mod test_utils;

use autogen_agentchat::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use test_utils::*;

#[tokio::test]
async fn test_string_argument_is_coerced_and_answered() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let registry = registry_with(vec![square_tool(Arc::clone(&invocations))]);
    let coordinator = coordinator_with(registry, LoopConfig::default());
    let client = ScriptedClient::shared(vec![
        call("square", json!({"x": "12"})),
        say("12 squared is 144"),
    ]);

    let id = coordinator
        .create_session(
            SessionSpec::new(
                vec![participant("math", &["square"], client.clone())],
                TerminationCondition::max_turns(1),
            )
            .with_task("What is 12 squared?"),
        )
        .await
        .unwrap();

    let turn = coordinator.advance(&id).await.unwrap().turn().cloned().unwrap();
    assert_eq!(turn.message, "12 squared is 144");
    assert_eq!(turn.limitation, None);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    assert_eq!(turn.tool_calls.len(), 1);
    let exchange = &turn.tool_calls[0];
    assert_eq!(exchange.call.tool_name, "square");
    assert_eq!(exchange.call.arguments["x"], json!(12));
    assert_eq!(exchange.call.attempt, 1);
    assert_eq!(exchange.call.turn_id, 1);
    assert!(exchange.result.is_ok());
    assert_eq!(exchange.result.raw_payload, json!(144));
    assert_eq!(exchange.result.call_ref, exchange.call.call_id);

    // The model saw the observation before answering
    let second_request = &client.seen()[1];
    assert!(texts(second_request).iter().any(|t| t.contains("144")));
    assert_eq!(coordinator.session_state(&id).await.unwrap(), SessionState::Terminated);
}

#[tokio::test]
async fn test_timeouts_are_retried_until_success() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let registry = registry_with(vec![slow_then_fast_tool("weather", 2, Arc::clone(&invocations))]);
    let coordinator = coordinator_with(
        registry,
        LoopConfig {
            tool_timeout_ms: 50,
            ..LoopConfig::default()
        },
    );
    let client = ScriptedClient::shared(vec![
        call("weather", json!({"query": "Oslo"})),
        say("It is sunny in Oslo"),
    ]);
    let id = coordinator
        .create_session(SessionSpec::new(
            vec![participant("forecaster", &["weather"], client.clone())],
            TerminationCondition::max_turns(1),
        ))
        .await
        .unwrap();

    let turn = coordinator.advance(&id).await.unwrap().turn().cloned().unwrap();
    assert_eq!(turn.message, "It is sunny in Oslo");
    assert_eq!(turn.limitation, None);
    assert_eq!(invocations.load(Ordering::SeqCst), 3);

    let attempts: Vec<u32> = turn.tool_calls.iter().map(|e| e.call.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    let chain = &turn.tool_calls[0].call.chain_id;
    assert!(turn.tool_calls.iter().all(|e| &e.call.chain_id == chain));
    assert_eq!(turn.tool_calls[0].result.error_kind, Some(ErrorKind::Timeout));
    assert_eq!(turn.tool_calls[1].result.error_kind, Some(ErrorKind::Timeout));
    assert!(turn.tool_calls[2].result.is_ok());

    // Only the final observation reaches the model
    assert_eq!(client.call_count(), 2);
}

#[tokio::test]
async fn test_max_turns_ends_session_after_exact_count() {
    let registry = registry_with(Vec::new());
    let coordinator = coordinator_with(registry, LoopConfig::default());
    let client: Arc<dyn ChatCompletionClient> = Arc::new(ScriptedClient::with_fallback(Vec::new(), "noted"));
    let id = coordinator
        .create_session(SessionSpec::new(
            vec![
                participant("a", &[], Arc::clone(&client)),
                participant("b", &[], Arc::clone(&client)),
                participant("c", &[], Arc::clone(&client)),
            ],
            TerminationCondition::max_turns(5),
        ))
        .await
        .unwrap();

    for _ in 0..5 {
        assert!(matches!(coordinator.advance(&id).await.unwrap(), Advance::Turn(_)));
    }
    assert_eq!(
        coordinator.advance(&id).await.unwrap(),
        Advance::SessionEnded {
            state: SessionState::Terminated
        }
    );

    let transcript = coordinator.transcript(&id).await.unwrap();
    assert_eq!(transcript.len(), 5);
    let speakers: Vec<&str> = transcript.iter().map(|t| t.participant_id.as_str()).collect();
    assert_eq!(speakers, vec!["a", "b", "c", "a", "b"]);
    let sequence: Vec<u64> = transcript.iter().map(|t| t.sequence_number).collect();
    assert_eq!(sequence, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_tool_outside_allow_list_is_never_invoked() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let registry = registry_with(vec![
        square_tool(Arc::clone(&invocations)),
        failing_tool("delete_files", "internal"),
    ]);
    let coordinator = coordinator_with(registry, LoopConfig::default());
    let client = ScriptedClient::shared(vec![
        call("delete_files", json!({})),
        say("I cannot do that, but I can square numbers"),
    ]);
    let id = coordinator
        .create_session(SessionSpec::new(
            vec![participant("math", &["square"], client.clone())],
            TerminationCondition::max_turns(1),
        ))
        .await
        .unwrap();

    let turn = coordinator.advance(&id).await.unwrap().turn().cloned().unwrap();
    assert_eq!(turn.message, "I cannot do that, but I can square numbers");
    assert!(turn.tool_calls.is_empty());
    assert_eq!(turn.limitation, None);

    // Only allowed tools are offered, and the rejection is explained
    assert_eq!(client.offered()[0], vec!["square".to_string()]);
    let feedback = texts(&client.seen()[1]);
    assert!(feedback.iter().any(|t| t.contains("delete_files") && t.contains("not available")));
}

#[tokio::test]
async fn test_exhausted_tool_degrades_gracefully() {
    let registry = registry_with(vec![failing_tool("search", "server_error")]);
    let coordinator = coordinator_with(registry, LoopConfig::default());
    let client = ScriptedClient::shared(vec![
        call("search", json!({})),
        say("Search is down, answering from memory"),
    ]);
    let id = coordinator
        .create_session(SessionSpec::new(
            vec![participant("researcher", &["search"], client)],
            TerminationCondition::max_turns(1),
        ))
        .await
        .unwrap();

    let turn = coordinator.advance(&id).await.unwrap().turn().cloned().unwrap();
    assert_eq!(turn.tool_calls.len(), 3);
    assert!(turn.tool_calls.iter().all(|e| !e.result.is_ok()));
    assert_eq!(
        turn.limitation,
        Some(Limitation::ToolsUnavailable {
            tools: vec!["search".to_string()]
        })
    );
    assert_eq!(turn.message, "Search is down, answering from memory");
}

#[tokio::test]
async fn test_invocation_bound_forces_answer() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let registry = registry_with(vec![square_tool(Arc::clone(&invocations))]);
    let coordinator = coordinator_with(
        registry,
        LoopConfig {
            max_invocations: 2,
            ..LoopConfig::default()
        },
    );
    let client = ScriptedClient::shared(vec![
        call("square", json!({"x": 2})),
        call("square", json!({"x": 3})),
        call("square", json!({"x": 4})),
    ]);
    let id = coordinator
        .create_session(SessionSpec::new(
            vec![participant("math", &["square"], client)],
            TerminationCondition::max_turns(1),
        ))
        .await
        .unwrap();

    let turn = coordinator.advance(&id).await.unwrap().turn().cloned().unwrap();
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
    assert_eq!(turn.limitation, Some(Limitation::LoopBoundExceeded { max_invocations: 2 }));
    assert!(turn.message.contains("Best available result: 9"));
}
