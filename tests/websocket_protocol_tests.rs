//! End-to-end protocol tests against a live server with a memory driver.

mod common;

use common::{TestServer, SILENCE};
use serde_json::json;

#[tokio::test]
async fn test_welcome_on_connect() {
    let server = TestServer::start().await;
    let mut client = server.connect_raw().await;
    assert_eq!(client.recv().await, json!({"message": "Welcome!"}));
}

#[tokio::test]
async fn test_set_is_broadcast_to_every_session() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    let mut c = server.connect().await;
    server.wait_for_sessions(3).await;

    let request = json!({"action": "set", "target": "red", "value": true});
    a.send_json(request.clone()).await;

    let expected = json!({
        "message": "Successfully set red light to ON.",
        "received": request,
    });
    assert_eq!(a.recv().await, expected);
    assert_eq!(b.recv().await, expected);
    assert_eq!(c.recv().await, expected);

    let red = server.state.engine.registry().get("red").await.unwrap();
    assert!(red.known_state);
}

#[tokio::test]
async fn test_get_is_broadcast_after_read() {
    let server = TestServer::start().await;
    server.driver.set_level("green", true);
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    server.wait_for_sessions(2).await;

    b.send_json(json!({"action": "GET", "target": "Green"})).await;

    for client in [&mut a, &mut b] {
        let msg = client.recv().await;
        assert_eq!(msg["message"], "Current status of Green light is ON.");
        assert_eq!(msg["received"]["target"], "Green");
    }
}

#[tokio::test]
async fn test_unknown_target_goes_only_to_sender() {
    let server = TestServer::start().await;
    let mut sender = server.connect().await;
    let mut other = server.connect().await;
    server.wait_for_sessions(2).await;

    let request = json!({"action": "get", "target": "purple"});
    sender.send_json(request.clone()).await;

    assert_eq!(
        sender.recv().await,
        json!({
            "message": "Error, unknown target given. Target should be 'red', 'yellow', or 'green'.",
            "received": request,
        })
    );
    assert!(other.try_recv(SILENCE).await.is_none());
    assert!(server.driver.calls().is_empty());
}

#[tokio::test]
async fn test_echo_goes_only_to_sender() {
    let server = TestServer::start().await;
    let mut sender = server.connect().await;
    let mut other = server.connect().await;
    server.wait_for_sessions(2).await;

    sender.send(r#"{"action":"echo","note":"hi"}"#).await;
    assert_eq!(
        sender.recv().await,
        json!({"message": "ECHO Echo echo ....", "received": {"action": "echo", "note": "hi"}})
    );
    assert!(other.try_recv(SILENCE).await.is_none());
}

#[tokio::test]
async fn test_malformed_payload_gets_single_reply() {
    let server = TestServer::start().await;
    let mut sender = server.connect().await;
    let mut other = server.connect().await;
    server.wait_for_sessions(2).await;

    sender.send("red on please").await;
    assert_eq!(
        sender.recv().await,
        json!({"message": "Only JSON is currently supported."})
    );
    assert!(sender.try_recv(SILENCE).await.is_none());
    assert!(other.try_recv(SILENCE).await.is_none());

    for target in server.state.engine.registry().snapshot().await {
        assert!(target.updated_at.is_none());
    }
}

#[tokio::test]
async fn test_unknown_action_goes_only_to_sender() {
    let server = TestServer::start().await;
    let mut sender = server.connect().await;
    let mut other = server.connect().await;
    server.wait_for_sessions(2).await;

    sender.send_json(json!({"action": "dance", "target": "red"})).await;
    let reply = sender.recv().await;
    assert_eq!(reply["message"], "Sorry. Unknown action given.");
    assert_eq!(reply["received"]["action"], "dance");
    assert!(other.try_recv(SILENCE).await.is_none());
}

#[tokio::test]
async fn test_failed_read_is_silent_by_default() {
    let server = TestServer::start().await;
    server.driver.fail("yellow");
    let mut client = server.connect().await;

    client.send_json(json!({"action": "get", "target": "yellow"})).await;
    assert!(client.try_recv(SILENCE).await.is_none());
}

#[tokio::test]
async fn test_failed_read_reported_when_enabled() {
    let server = TestServer::start_with(|engine| engine.with_driver_error_replies(true)).await;
    server.driver.fail("yellow");
    let mut client = server.connect().await;
    let mut other = server.connect().await;
    server.wait_for_sessions(2).await;

    client.send_json(json!({"action": "get", "target": "yellow"})).await;
    assert_eq!(client.recv().await["message"], "Error reading yellow light.");
    assert!(other.try_recv(SILENCE).await.is_none());
}

#[tokio::test]
async fn test_disconnect_removes_session_and_skips_it_in_broadcasts() {
    let server = TestServer::start().await;
    let leaving = server.connect().await;
    let mut staying = server.connect().await;
    server.wait_for_sessions(2).await;

    leaving.close().await;
    server.wait_for_sessions(1).await;

    staying
        .send_json(json!({"action": "set", "target": "yellow", "value": false}))
        .await;
    assert_eq!(
        staying.recv().await["message"],
        "Successfully set yellow light to OFF."
    );
}

#[tokio::test]
async fn test_late_joiner_does_not_see_earlier_broadcast() {
    let server = TestServer::start().await;
    let mut early = server.connect().await;
    early
        .send_json(json!({"action": "set", "target": "red", "value": true}))
        .await;
    early.recv().await;

    let mut late = server.connect().await;
    assert!(late.try_recv(SILENCE).await.is_none());
}
