//! Coordinator behavior across turns and sessions

mod test_utils;

use autogen_agentchat::error::SessionError;
use autogen_agentchat::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use test_utils::*;

fn plain_coordinator() -> Arc<TeamCoordinator> {
    Arc::new(coordinator_with(registry_with(Vec::new()), LoopConfig::default()))
}

fn chatty(reply: &str) -> Arc<dyn ChatCompletionClient> {
    Arc::new(ScriptedClient::with_fallback(Vec::new(), reply))
}

#[tokio::test]
async fn test_text_mention_freezes_transcript() {
    let coordinator = plain_coordinator();
    let id = coordinator
        .create_session(SessionSpec::new(
            vec![
                participant("writer", &[], chatty("draft ready")),
                participant("critic", &[], chatty("looks fine. TERMINATE")),
            ],
            TerminationCondition::any_of(vec![
                TerminationCondition::text_mention("TERMINATE"),
                TerminationCondition::max_turns(20),
            ]),
        ))
        .await
        .unwrap();

    let produced = coordinator.run_until_end(&id, 10).await.unwrap();
    assert_eq!(produced.len(), 2);
    assert_eq!(coordinator.session_state(&id).await.unwrap(), SessionState::Terminated);

    for _ in 0..3 {
        assert_eq!(
            coordinator.advance(&id).await.unwrap(),
            Advance::SessionEnded {
                state: SessionState::Terminated
            }
        );
    }
    assert_eq!(coordinator.transcript(&id).await.unwrap(), produced);
    assert!(matches!(
        coordinator.post_user_message(&id, "one more thing").await,
        Err(AgentChatError::Session(SessionError::Ended { .. }))
    ));
}

#[tokio::test]
async fn test_concurrent_advances_keep_sequence_contiguous() {
    let coordinator = plain_coordinator();
    let id = coordinator
        .create_session(SessionSpec::new(
            vec![participant("a", &[], chatty("x")), participant("b", &[], chatty("y"))],
            TerminationCondition::max_turns(50),
        ))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let coordinator = Arc::clone(&coordinator);
        let id = id.clone();
        handles.push(tokio::spawn(async move { coordinator.advance(&id).await }));
    }
    for handle in handles {
        assert!(matches!(handle.await.unwrap().unwrap(), Advance::Turn(_)));
    }

    let transcript = coordinator.transcript(&id).await.unwrap();
    let sequence: Vec<u64> = transcript.iter().map(|t| t.sequence_number).collect();
    assert_eq!(sequence, (1..=8).collect::<Vec<u64>>());
    // Serialized advances still alternate speakers
    assert!(transcript.windows(2).all(|w| w[0].participant_id != w[1].participant_id));
}

#[tokio::test]
async fn test_handoff_overrides_next_speaker_once() {
    let coordinator = plain_coordinator();
    let planner = ScriptedClient::shared(vec![call("transfer_to_critic", json!({"message": "critic, check this"}))]);
    let id = coordinator
        .create_session(SessionSpec::new(
            vec![
                participant("planner", &[], planner.clone()),
                participant("coder", &[], chatty("code")),
                participant("critic", &[], chatty("critique")),
            ],
            TerminationCondition::max_turns(3),
        ))
        .await
        .unwrap();

    let turns = coordinator.run_until_end(&id, 10).await.unwrap();
    let speakers: Vec<&str> = turns.iter().map(|t| t.participant_id.as_str()).collect();
    assert_eq!(speakers, vec!["planner", "critic", "planner"]);
    assert_eq!(turns[0].handoff.as_deref(), Some("critic"));
    assert_eq!(turns[0].message, "critic, check this");

    let offered = &planner.offered()[0];
    assert!(offered.contains(&"transfer_to_coder".to_string()));
    assert!(offered.contains(&"transfer_to_critic".to_string()));
}

#[tokio::test]
async fn test_cancellation_during_turn_fails_session() {
    let coordinator = plain_coordinator();
    let id = coordinator
        .create_session(SessionSpec::new(
            vec![participant("slow", &[], ScriptedClient::shared(vec![Step::Hang]))],
            TerminationCondition::max_turns(5),
        ))
        .await
        .unwrap();

    let running = {
        let coordinator = Arc::clone(&coordinator);
        let id = id.clone();
        tokio::spawn(async move { coordinator.advance(&id).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    coordinator.cancel(&id).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("advance should return promptly after cancel")
        .unwrap();
    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(coordinator.session_state(&id).await.unwrap(), SessionState::Failed);
    assert!(coordinator.transcript(&id).await.unwrap().is_empty());
    assert_eq!(
        coordinator.advance(&id).await.unwrap(),
        Advance::SessionEnded {
            state: SessionState::Failed
        }
    );
}

#[tokio::test]
async fn test_model_error_leaves_session_active() {
    let coordinator = plain_coordinator();
    let client = ScriptedClient::shared(vec![Step::Fail("rate limited".to_string()), say("recovered")]);
    let id = coordinator
        .create_session(SessionSpec::new(
            vec![participant("a", &[], client)],
            TerminationCondition::max_turns(1),
        ))
        .await
        .unwrap();

    assert!(matches!(coordinator.advance(&id).await, Err(AgentChatError::Model(_))));
    assert_eq!(coordinator.session_state(&id).await.unwrap(), SessionState::Active);
    let turn = coordinator.advance(&id).await.unwrap();
    assert_eq!(turn.turn().unwrap().message, "recovered");
    assert_eq!(turn.turn().unwrap().sequence_number, 1);
}

#[tokio::test]
async fn test_all_participants_idle_ends_session() {
    let coordinator = plain_coordinator();
    let id = coordinator
        .create_session(SessionSpec::new(
            vec![participant("a", &[], chatty("agreed")), participant("b", &[], chatty("agreed"))],
            TerminationCondition::any_of(vec![
                TerminationCondition::AllParticipantsIdle,
                TerminationCondition::max_turns(10),
            ]),
        ))
        .await
        .unwrap();

    let turns = coordinator.run_until_end(&id, 10).await.unwrap();
    assert_eq!(turns.len(), 4);
    assert_eq!(coordinator.session_state(&id).await.unwrap(), SessionState::Terminated);
}

#[tokio::test]
async fn test_sessions_run_independently_in_parallel() {
    let coordinator = plain_coordinator();
    let mut handles = Vec::new();
    for i in 0..8 {
        let coordinator = Arc::clone(&coordinator);
        handles.push(tokio::spawn(async move {
            let id = coordinator
                .create_session(
                    SessionSpec::new(
                        vec![
                            participant("a", &[], chatty(&format!("a{}", i))),
                            participant("b", &[], chatty(&format!("b{}", i))),
                        ],
                        TerminationCondition::max_turns(3),
                    )
                    .with_session_id(format!("session-{}", i)),
                )
                .await
                .unwrap();
            coordinator.run_until_end(&id, 10).await.unwrap();
            id
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let id = handle.await.unwrap();
        let transcript = coordinator.transcript(&id).await.unwrap();
        assert_eq!(transcript.len(), 3);
        assert!(transcript.iter().all(|t| t.session_id == id));
        assert!(transcript[0].message.ends_with(&i.to_string()));
        assert_eq!(coordinator.session_state(&id).await.unwrap(), SessionState::Terminated);
    }
    assert_eq!(coordinator.store().list_sessions().await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_peers_see_each_other_as_attributed_users() {
    let coordinator = plain_coordinator();
    let second = ScriptedClient::shared(vec![say("reply")]);
    let id = coordinator
        .create_session(
            SessionSpec::new(
                vec![participant("first", &[], chatty("opening")), participant("second", &[], second.clone())],
                TerminationCondition::max_turns(2),
            )
            .with_task("discuss"),
        )
        .await
        .unwrap();
    coordinator.run_until_end(&id, 5).await.unwrap();

    let seen = &second.seen()[0];
    assert_eq!(seen[1], LlmMessage::user("discuss", Some("user".to_string())));
    assert_eq!(seen[2], LlmMessage::user("opening", Some("first".to_string())));
}

#[tokio::test]
async fn test_file_system_store_backs_coordinator() {
    let dir = TempDir::new().unwrap();
    let context = LoopContext::new(registry_with(Vec::new()));
    let coordinator = TeamCoordinator::new(
        ReasoningLoop::new(context),
        Arc::new(FileSystemSessionStore::new(dir.path())),
        CoordinatorConfig::default(),
    );
    let id = coordinator
        .create_session(
            SessionSpec::new(vec![participant("a", &[], chatty("persisted"))], TerminationCondition::max_turns(2))
                .with_session_id("durable"),
        )
        .await
        .unwrap();
    coordinator.run_until_end(&id, 5).await.unwrap();

    let reopened = FileSystemSessionStore::new(dir.path());
    assert_eq!(reopened.get_state("durable").await.unwrap(), SessionState::Terminated);
    let turns = reopened.read("durable", 0).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert!(turns.iter().all(|t| t.message == "persisted"));
}
