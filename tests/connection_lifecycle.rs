//! Integration tests for the client connection lifecycle.
//!
//! Covers upgrade and authentication, protocol errors that keep the connection
//! open, reconnect replacement, presence and server shutdown.

mod common;

use common::{TestClient, TestServer};
use serde_json::json;
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

#[tokio::test]
async fn test_bad_frames_keep_connection_open() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut alice = TestClient::connect(&server.url(), "alice")
        .await
        .expect("Failed to connect");

    alice.send_raw("this is not json").await.expect("send");
    let reply = alice.recv().await.expect("reply");
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], "invalid_json");

    alice.send("poke", json!({})).await.expect("send");
    let reply = alice.recv().await.expect("reply");
    assert_eq!(reply["code"], "unknown_kind");

    alice
        .send("follow_request", json!({ "wrong": "field" }))
        .await
        .expect("send");
    let reply = alice.recv().await.expect("reply");
    assert_eq!(reply["code"], "invalid_payload");

    // Still connected and still dispatching.
    alice
        .send("unfollow", json!({ "recipient_Id": "bob" }))
        .await
        .expect("send");
    let reply = alice.recv().await.expect("reply");
    assert_eq!(reply["code"], "not_following");
    assert!(server.hub.is_online("alice"));
}

#[tokio::test]
async fn test_missing_credentials_closed_with_policy_violation() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");

    let mut anonymous = TestClient::connect_anonymous(&server.url())
        .await
        .expect("upgrade completes before authentication");
    let frame = anonymous.expect_close().await.expect("close");
    assert_eq!(frame.map(|f| f.code), Some(CloseCode::Policy));

    let mut stranger = TestClient::connect(&server.url(), "mallory")
        .await
        .expect("upgrade completes before authentication");
    let frame = stranger.expect_close().await.expect("close");
    assert_eq!(frame.map(|f| f.code), Some(CloseCode::Policy));

    assert_eq!(server.hub.stats().registrations, 0);
}

#[tokio::test]
async fn test_wrong_path_is_rejected_during_handshake() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let result = TestClient::connect(&server.url_with_path("/chat"), "alice").await;
    assert!(result.is_err(), "upgrade on an unknown path must fail");
}

#[tokio::test]
async fn test_disallowed_origin_is_rejected() {
    let server = TestServer::spawn_with(|config| {
        config.listen.allow_origins = vec!["https://social.example".to_string()];
    })
    .await
    .expect("Failed to spawn test server");

    // tungstenite clients send no Origin header; only listed origins pass.
    let result = TestClient::connect(&server.url(), "alice").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_reconnect_replaces_previous_connection() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut first = TestClient::connect(&server.url(), "alice")
        .await
        .expect("first connection");
    server.wait_online("alice", true).await.expect("online");

    let mut second = TestClient::connect(&server.url(), "alice")
        .await
        .expect("second connection");

    let frame = first.expect_close().await.expect("old connection closed");
    assert_eq!(frame.map(|f| f.code), Some(CloseCode::Away));

    let stats = server.hub.stats();
    assert_eq!(stats.replacements, 1);
    assert_eq!(stats.live_clients, 1);

    // The old connection's late cleanup must not evict the new one.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.hub.is_online("alice"));
    second
        .send("unfollow", json!({ "recipient_Id": "bob" }))
        .await
        .expect("send");
    assert_eq!(second.recv().await.expect("reply")["code"], "not_following");
}

#[tokio::test]
async fn test_presence_online_and_offline() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut alice = TestClient::connect(&server.url(), "alice")
        .await
        .expect("alice");
    server.wait_online("alice", true).await.expect("online");

    let bob = TestClient::connect(&server.url(), "bob").await.expect("bob");
    let online = alice.recv().await.expect("presence");
    assert_eq!(online["type"], "presence");
    assert_eq!(online["data"]["user_id"], "bob");
    assert_eq!(online["data"]["status"], "online");

    bob.close().await.expect("close");
    let offline = alice.recv().await.expect("presence");
    assert_eq!(offline["data"]["user_id"], "bob");
    assert_eq!(offline["data"]["status"], "offline");
    server.wait_online("bob", false).await.expect("offline");
}

#[tokio::test]
async fn test_oversized_frame_closes_connection() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut alice = TestClient::connect(&server.url(), "alice")
        .await
        .expect("Failed to connect");
    server.wait_online("alice", true).await.expect("online");

    let huge = "x".repeat(4096);
    let _ = alice
        .send("private_message", json!({ "recipient_Id": "bob", "message": huge }))
        .await;

    let _ = alice.expect_close().await;
    server.wait_online("alice", false).await.expect("unregistered");
    assert!(
        server
            .db
            .messages()
            .private_history("alice", "bob")
            .await
            .expect("history")
            .is_empty()
    );
}

#[tokio::test]
async fn test_rate_limit_rejects_excess_frames() {
    let server = TestServer::spawn_with(|config| {
        config.limits.messages_per_second = 1;
        config.limits.burst = 2;
    })
    .await
    .expect("Failed to spawn test server");
    let mut alice = TestClient::connect(&server.url(), "alice")
        .await
        .expect("Failed to connect");

    for _ in 0..5 {
        alice
            .send("unfollow", json!({ "recipient_Id": "bob" }))
            .await
            .expect("send");
    }
    let codes: Vec<_> = {
        let mut codes = Vec::new();
        for _ in 0..5 {
            let frame = alice.recv().await.expect("reply");
            codes.push(frame["code"].as_str().unwrap_or_default().to_string());
        }
        codes
    };
    assert!(codes.iter().any(|c| c == "rate_limited"));
    assert!(codes.iter().any(|c| c == "not_following"));
}

#[tokio::test]
async fn test_server_shutdown_disconnects_clients() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut alice = TestClient::connect(&server.url(), "alice")
        .await
        .expect("Failed to connect");
    server.wait_online("alice", true).await.expect("online");

    server.stop().await.expect("stop");

    let frame = alice.expect_close().await.expect("close");
    assert_eq!(frame.map(|f| f.code), Some(CloseCode::Away));
}
