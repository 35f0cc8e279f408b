//! The interrupt fallback ladder across protocol versions.

use crate::prelude::*;

fn error_reply(id: i64, code: i64, message: &str) -> String {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}).to_string()
}

/// Peer that rejects every interrupt spelling: turn-scoped with a turn-id
/// mismatch, thread-scoped and conversation-scoped as unknown methods.
fn hostile_responder() -> Responder {
    Arc::new(|method, id, params| {
        let Some(id) = id else { return Vec::new() };
        match method {
            "thread/start" => {
                vec![json!({"jsonrpc": "2.0", "id": id, "result": {"thread": {"id": "th-spec"}}})
                    .to_string()]
            }
            "turn/interrupt" if params.get("turnId").is_some() => {
                vec![error_reply(id, -32000, "turn not found")]
            }
            "turn/interrupt" => vec![error_reply(id, -32601, "method not found")],
            "interruptConversation" => vec![error_reply(id, -32601, "method not found")],
            _ => vec![json!({"jsonrpc": "2.0", "id": id, "result": {}}).to_string()],
        }
    })
}

#[tokio::test]
async fn full_ladder_ends_at_command_notification() {
    let mut server = FakeServer::start(hostile_responder()).await;
    let agent = server.connected_agent().await;
    record_events(&agent);

    server.send(json!({
        "jsonrpc": "2.0",
        "method": "turn/started",
        "params": {"turnId": "T"},
    }));
    wait_turn(&agent, Some("T")).await;

    agent.send_command("/interrupt", &[]).await.unwrap();

    // Tier 1: turn-scoped.
    let first = server.next_method("turn/interrupt").await;
    assert_eq!(first["params"]["threadId"], "th-spec");
    assert_eq!(first["params"]["turnId"], "T");

    // Tier 2: thread-scoped retry after the mismatch.
    let second = server.next_method("turn/interrupt").await;
    assert_eq!(second["params"]["threadId"], "th-spec");
    assert!(second["params"].get("turnId").is_none());

    // Tier 3: conversation-scoped.
    let third = server.next_method("interruptConversation").await;
    assert_eq!(third["params"]["conversationId"], "th-spec");

    // Tier 4: plain command notification.
    let fourth = server.next_method("command").await;
    assert!(fourth.get("id").is_none());
    assert_eq!(fourth["params"]["command"], "/interrupt");

    agent.kill().await;
}

#[tokio::test]
async fn turn_scoped_interrupt_succeeds_first_try() {
    let mut server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;
    record_events(&agent);

    server.send(json!({
        "jsonrpc": "2.0",
        "method": "turn/started",
        "params": {"turnId": "T9"},
    }));
    wait_turn(&agent, Some("T9")).await;

    agent.send_command("/interrupt", &[]).await.unwrap();

    let frame = server.next_method("turn/interrupt").await;
    assert_eq!(frame["params"]["turnId"], "T9");

    // No fallback traffic follows; the next protocol frame is our probe.
    agent.list_threads(None).await.unwrap();
    let next = server
        .next_frame(|f| f.get("method").is_some() && f["method"] != "turn/interrupt")
        .await;
    assert_eq!(next["method"], "thread/list");

    agent.kill().await;
}

#[tokio::test]
async fn no_active_turn_goes_straight_to_conversation_scope() {
    let mut server = FakeServer::start(hostile_responder()).await;
    let agent = server.connected_agent().await;
    record_events(&agent);

    assert_eq!(agent.active_turn(), None);
    agent.send_command("/interrupt", &[]).await.unwrap();

    let first = server
        .next_frame(|f| {
            matches!(
                f["method"].as_str(),
                Some("interruptConversation") | Some("turn/interrupt")
            )
        })
        .await;
    assert_eq!(first["method"], "interruptConversation");

    // The hostile peer rejects it, so the command notification follows.
    let second = server.next_method("command").await;
    assert_eq!(second["params"]["command"], "/interrupt");

    agent.kill().await;
}

#[tokio::test]
async fn hard_rpc_failure_propagates_instead_of_degrading() {
    let responder: Responder = Arc::new(|method, id, _| {
        let Some(id) = id else { return Vec::new() };
        match method {
            "thread/start" => {
                vec![json!({"jsonrpc": "2.0", "id": id, "result": {"thread": {"id": "th-spec"}}})
                    .to_string()]
            }
            "interruptConversation" => vec![error_reply(id, -32000, "peer exploded")],
            _ => vec![json!({"jsonrpc": "2.0", "id": id, "result": {}}).to_string()],
        }
    });
    let server = FakeServer::start(responder).await;
    let agent = server.connected_agent().await;
    record_events(&agent);

    // No active turn: conversation scope is tried first and its hard
    // failure must surface, not degrade to a notification.
    let err = agent.send_command("/interrupt", &[]).await;
    match err {
        Err(ClientError::Rpc { code, message, .. }) => {
            assert_eq!(code, -32000);
            assert!(message.contains("peer exploded"));
        }
        other => panic!("expected rpc error, got {other:?}"),
    }

    agent.kill().await;
}

#[tokio::test]
async fn other_commands_are_plain_notifications() {
    let mut server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;

    agent.send_command("/model", &["gpt-x".to_string()]).await.unwrap();

    let frame = server.next_method("command").await;
    assert!(frame.get("id").is_none());
    assert_eq!(frame["params"]["command"], "/model");
    assert_eq!(frame["params"]["args"][0], "gpt-x");

    agent.kill().await;
}
