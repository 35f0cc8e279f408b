//! Reconnect backoff budget, narration events, and post-reconnect listener
//! rebind.

use crate::prelude::*;

#[tokio::test]
async fn exhausted_reconnect_budget_emits_full_narration() {
    let mut server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;
    let events = record_events(&agent);

    // Refuse new connections, then cut the live one: every reconnect
    // attempt must fail.
    server.stop_listening();
    server.drop_connection();

    wait_until(&events, |evs| {
        evs.iter().any(|e| {
            e.event_type == types::BACKGROUND_EVENT && e.params["status"] == "failed"
        })
    })
    .await;

    let guard = events.lock();
    let reconnecting: Vec<&AgentEvent> = guard
        .iter()
        .filter(|e| {
            e.event_type == types::BACKGROUND_EVENT && e.params["status"] == "reconnecting"
        })
        .collect();
    assert_eq!(reconnecting.len(), 3);
    for (i, ev) in reconnecting.iter().enumerate() {
        assert_eq!(ev.params["attempt"], json!(i as u64 + 1));
        assert_eq!(ev.params["max_retries"], json!(3));
        assert_eq!(ev.params["active"], json!(true));
        assert_eq!(ev.params["done"], json!(false));
    }

    let retries: Vec<bool> = guard
        .iter()
        .filter(|e| e.event_type == types::STREAM_ERROR)
        .map(|e| e.params["willRetry"].as_bool().unwrap())
        .collect();
    assert_eq!(retries, vec![true, true, false]);

    let failed: Vec<&AgentEvent> = guard
        .iter()
        .filter(|e| e.event_type == types::BACKGROUND_EVENT && e.params["status"] == "failed")
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].params["done"], json!(true));
    drop(guard);

    agent.kill().await;
}

#[tokio::test]
async fn successful_reconnect_rebinds_the_listener() {
    let mut server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;
    let events = record_events(&agent);
    server.next_method("thread/start").await;

    server.drop_connection();

    wait_until(&events, |evs| {
        evs.iter().any(|e| {
            e.event_type == types::BACKGROUND_EVENT && e.params["status"] == "completed"
        })
    })
    .await;

    // The fresh socket re-subscribes the existing thread.
    let rebind = server.next_method("thread/resume").await;
    assert_eq!(rebind["params"]["threadId"], "th-spec");

    // The rebound session still carries traffic.
    agent.list_threads(None).await.unwrap();

    agent.kill().await;
}

#[tokio::test]
async fn reconnected_session_delivers_events_again() {
    let server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;
    let events = record_events(&agent);

    server.drop_connection();
    wait_until(&events, |evs| {
        evs.iter().any(|e| {
            e.event_type == types::BACKGROUND_EVENT && e.params["status"] == "completed"
        })
    })
    .await;

    server.send(json!({"jsonrpc": "2.0", "method": "codex/event/idle", "params": {}}));
    wait_until(&events, |evs| evs.iter().any(|e| e.event_type == "idle")).await;

    agent.kill().await;
}

#[tokio::test]
async fn non_retryable_reconnect_failure_clears_active_turn() {
    let mut server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;
    let events = record_events(&agent);

    server.send(json!({
        "jsonrpc": "2.0",
        "method": "turn/started",
        "params": {"turnId": "T"},
    }));
    wait_turn(&agent, Some("T")).await;

    server.stop_listening();
    server.drop_connection();

    wait_until(&events, |evs| {
        evs.iter().any(|e| {
            e.event_type == types::BACKGROUND_EVENT && e.params["status"] == "failed"
        })
    })
    .await;

    // The final stream_error carried willRetry=false and must have
    // cleared the turn; no synthetic turn_complete is ever emitted.
    assert_eq!(agent.active_turn(), None);
    assert!(!events.lock().iter().any(|e| e.event_type == types::TURN_COMPLETE));

    agent.kill().await;
}
