//! Shutdown bounds, idempotence, and process teardown.

use crate::prelude::*;

#[tokio::test]
async fn shutdown_is_idempotent_and_bounded() {
    let mut server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;
    assert!(agent.running());

    let started = std::time::Instant::now();
    agent.shutdown().await.unwrap();
    agent.shutdown().await.unwrap();
    let elapsed = started.elapsed();

    // 3s read-loop budget + 5s reap budget, with slack; the child is a
    // healthy `sleep` so the real path is much faster.
    assert!(elapsed < Duration::from_secs(9), "shutdown took {elapsed:?}");
    assert!(!agent.running());

    // The peer saw the courtesy shutdown notification.
    server.next_method("shutdown").await;
}

#[tokio::test]
async fn shutdown_rejects_later_operations() {
    let server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;

    agent.shutdown().await.unwrap();

    assert!(matches!(agent.list_threads(None).await, Err(ClientError::Stopped)));
    assert!(matches!(agent.submit("x", &[], &[], None).await, Err(ClientError::Stopped)));
    drop(server);
}

#[tokio::test]
async fn shutdown_fails_remaining_in_flight_calls() {
    // Never answer thread/list so the call is parked when shutdown runs.
    let responder: Responder = Arc::new(|method, id, _| {
        let Some(id) = id else { return Vec::new() };
        match method {
            "thread/start" => {
                vec![json!({"jsonrpc": "2.0", "id": id, "result": {"thread": {"id": "th-spec"}}})
                    .to_string()]
            }
            "thread/list" => Vec::new(),
            _ => vec![json!({"jsonrpc": "2.0", "id": id, "result": {}}).to_string()],
        }
    });
    let mut server = FakeServer::start(responder).await;
    let agent = server.connected_agent().await;

    let pending = tokio::spawn({
        let agent = agent.clone();
        async move { agent.list_threads(None).await }
    });
    server.next_method("thread/list").await;

    agent.shutdown().await.unwrap();

    let result = pending.await.unwrap();
    assert!(
        matches!(result, Err(ClientError::Stopped) | Err(ClientError::Transport { .. })),
        "expected cancellation, got {result:?}"
    );
}

#[tokio::test]
async fn kill_tears_down_without_grace() {
    let server = FakeServer::start(default_responder()).await;
    let agent = server.connected_agent().await;
    assert!(agent.running());

    let started = std::time::Instant::now();
    agent.kill().await;
    assert!(started.elapsed() < Duration::from_secs(6));
    assert!(!agent.running());
    drop(server);
}

#[tokio::test]
async fn spawn_failure_reports_startup_error() {
    // No listener on the probed port: readiness can never be observed.
    let agent = CodexAgent::new(1, "spec-agent")
        .with_command(ServerCommand { program: "sleep".into(), args: vec!["300".into()] })
        .with_tunables(Tunables {
            ready_timeout: Duration::from_millis(300),
            ready_poll: Duration::from_millis(20),
            ..fast_tunables()
        });

    let err = agent.spawn_and_connect(SpawnOptions::default()).await;
    assert!(matches!(err, Err(ClientError::Startup(_))), "got {err:?}");
    assert!(!agent.running());
}
