//! Turn lifecycle tracking and submit input construction on the wire.

use crate::prelude::*;

#[tokio::test]
async fn notification_lifecycle_sets_and_clears_active_turn() {
    let server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;
    record_events(&agent);

    server.send(json!({
        "jsonrpc": "2.0",
        "method": "turn/started",
        "params": {"turn": {"id": "T"}},
    }));
    wait_turn(&agent, Some("T")).await;

    server.send(json!({"jsonrpc": "2.0", "method": "turn/completed", "params": {}}));
    wait_turn(&agent, None).await;

    agent.kill().await;
}

#[tokio::test]
async fn retryable_stream_error_preserves_turn_non_retryable_clears() {
    let server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;
    record_events(&agent);

    server.send(json!({
        "jsonrpc": "2.0",
        "method": "turn/started",
        "params": {"turnId": "T2"},
    }));
    wait_turn(&agent, Some("T2")).await;

    server.send(json!({
        "jsonrpc": "2.0",
        "method": "error",
        "params": {"error": {"message": "hiccup"}, "willRetry": true},
    }));
    // Still active after the retryable error.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(agent.active_turn().as_deref(), Some("T2"));

    server.send(json!({
        "jsonrpc": "2.0",
        "method": "error",
        "params": {"error": {"message": "fatal"}, "willRetry": false},
    }));
    wait_turn(&agent, None).await;

    agent.kill().await;
}

#[tokio::test]
async fn turn_aborted_is_terminal() {
    let server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;
    record_events(&agent);

    server.send(json!({
        "jsonrpc": "2.0",
        "method": "codex/event/turn_started",
        "params": {"msg": {"turn_id": "T3"}},
    }));
    wait_turn(&agent, Some("T3")).await;

    server.send(json!({"jsonrpc": "2.0", "method": "turn/aborted", "params": {}}));
    wait_turn(&agent, None).await;

    agent.kill().await;
}

#[tokio::test]
async fn submit_harvests_turn_id_from_response() {
    let server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;
    record_events(&agent);

    // No turn/started notification arrives; the response is the fallback.
    agent.submit("do it", &[], &[], None).await.unwrap();
    assert_eq!(agent.active_turn().as_deref(), Some("tu-spec"));

    agent.kill().await;
}

#[tokio::test]
async fn submit_sends_inputs_in_declared_order() {
    let mut server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;

    agent
        .submit(
            "see this",
            &[
                "https://x/y.png".to_string(),
                "data:image/png;base64,AAA".to_string(),
                "/a.png".to_string(),
            ],
            &["/docs/r.txt".to_string()],
            None,
        )
        .await
        .unwrap();

    let frame = server.next_method("turn/start").await;
    assert_eq!(frame["params"]["threadId"], "th-spec");
    let items = frame["params"]["input"].as_array().unwrap();
    assert_eq!(items.len(), 5);
    assert_eq!(items[0], json!({"type": "text", "text": "see this"}));
    assert_eq!(items[1], json!({"type": "image", "url": "https://x/y.png"}));
    assert_eq!(items[2], json!({"type": "image", "url": "data:image/png;base64,AAA"}));
    assert_eq!(items[3], json!({"type": "localImage", "path": "/a.png"}));
    assert_eq!(items[4], json!({"type": "mention", "name": "r.txt", "path": "/docs/r.txt"}));

    agent.kill().await;
}

#[tokio::test]
async fn submit_with_output_schema_forwards_it() {
    let mut server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;

    let schema = json!({"type": "object", "properties": {"ok": {"type": "boolean"}}});
    agent.submit("check", &[], &[], Some(schema.clone())).await.unwrap();

    let frame = server.next_method("turn/start").await;
    assert_eq!(frame["params"]["outputSchema"], schema);

    agent.kill().await;
}

#[tokio::test]
async fn dynamic_tool_result_is_a_response_when_request_id_present() {
    let mut server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;

    agent
        .send_dynamic_tool_result("call-1", "tool says hi", Some(8001))
        .await
        .unwrap();

    let reply = server
        .next_frame(|f| f["id"] == 8001 && f.get("method").is_none())
        .await;
    assert_eq!(reply["result"]["success"], true);
    assert_eq!(reply["result"]["contentItems"][0]["type"], "inputText");
    assert_eq!(reply["result"]["contentItems"][0]["text"], "tool says hi");

    agent.kill().await;
}

#[tokio::test]
async fn dynamic_tool_result_degrades_to_notification_without_id() {
    let mut server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;

    agent.send_dynamic_tool_result("call-2", "late output", None).await.unwrap();

    let frame = server.next_method("dynamic_tool_result").await;
    assert!(frame.get("id").is_none());
    assert_eq!(frame["params"]["callId"], "call-2");
    assert_eq!(frame["params"]["call_id"], "call-2");
    assert_eq!(frame["params"]["output"], "late output");

    agent.kill().await;
}
