//! E2E tests for the signaling server
//!
//! Runs the real WebSocket server on an ephemeral port with a scripted engine
//! and talks to it with a tungstenite client.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use common::{eventually, nominated_stats, FakeFactory};
use natscope::engine::IceConnectionState;
use natscope::signaling::SessionRegistry;
use natscope::{ServerConfig, SignalingServer};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    port: u16,
    registry: Arc<SessionRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(factory: FakeFactory) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let config = ServerConfig::new("127.0.0.1", port, "/ws", vec![]).unwrap();
        let server = SignalingServer::new(config, Arc::new(factory));
        let registry = server.registry();
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let _ = server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            port,
            registry,
            shutdown: Some(tx),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("ws://127.0.0.1:{}{}", self.port, path)
    }

    async fn connect(&self) -> Client {
        let (client, _) = connect_async(self.url("/ws"))
            .await
            .expect("Failed to connect");
        client
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

async fn send_json(client: &mut Client, value: serde_json::Value) {
    client
        .send(Message::Text(value.to_string()))
        .await
        .expect("Failed to send");
}

async fn recv_json(client: &mut Client) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timed out waiting for server message")
            .expect("Connection closed")
            .expect("WebSocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("Server sent invalid JSON");
        }
    }
}

/// Test: auth round trip and error replies over the socket
#[tokio::test]
async fn test_auth_and_errors() {
    let server = TestServer::start(FakeFactory::new()).await;
    let mut client = server.connect().await;

    send_json(&mut client, serde_json::json!({"type": "auth"})).await;
    assert_eq!(
        recv_json(&mut client).await,
        serde_json::json!({"type": "auth_ok", "ok": true})
    );

    client
        .send(Message::Text("definitely not json".to_string()))
        .await
        .unwrap();
    let reply = recv_json(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], "BAD_JSON");
    assert_eq!(reply["message"], "Message must be valid JSON");

    send_json(&mut client, serde_json::json!({"type": "ping"})).await;
    assert_eq!(recv_json(&mut client).await["code"], "UNKNOWN_MESSAGE");

    let _ = client.close(None).await;
    server.stop().await;
}

/// Test: full negotiation ending in a nat_result
#[tokio::test]
async fn test_offer_to_nat_result() {
    let factory = FakeFactory::with_stats(nominated_stats("host", "203.0.113.20", 55000));
    let server = TestServer::start(factory.clone()).await;
    let mut client = server.connect().await;

    send_json(&mut client, serde_json::json!({"type": "offer", "sdp": "v=0"})).await;
    let answer = recv_json(&mut client).await;
    assert_eq!(answer["type"], "answer");
    assert_eq!(answer["sdp"]["type"], "answer");

    send_json(
        &mut client,
        serde_json::json!({
            "type": "candidate",
            "candidate": "candidate:842163049 1 udp 1677729535 203.0.113.10 55000 typ srflx raddr 0.0.0.0 rport 0",
            "sdpMid": "0",
            "sdpMLineIndex": 0
        }),
    )
    .await;

    // wait for the candidate to reach the engine before ICE "connects"
    assert!(eventually(|| factory.log.lock().candidates.len() == 1).await);
    factory
        .last_sink()
        .on_ice_connection_state(IceConnectionState::Connected);

    let result = recv_json(&mut client).await;
    assert_eq!(result["type"], "nat_result");
    assert_eq!(result["nat_type"], "OPEN");
    assert_eq!(result["nat_label"], "Open Internet (heuristic)");
    assert_eq!(result["method"], "ICE-HEUR");
    assert_eq!(result["remote_selected_type"], "host");
    assert_eq!(result["external_ip"], "203.0.113.20");
    assert_eq!(result["external_port"], 55000);
    assert_eq!(result["srflx_ports"], serde_json::json!([55000]));
    assert_eq!(
        result["evidence"],
        serde_json::json!({
            "mapping": "EIM",
            "filtering": "EIF",
            "srflx_ports": [55000],
            "relay_only": false
        })
    );

    let _ = client.close(None).await;
    server.stop().await;
}

/// Test: sessions are registered while open and released on close
#[tokio::test]
async fn test_registry_tracks_sessions() {
    let factory = FakeFactory::new();
    let server = TestServer::start(factory.clone()).await;

    let mut client = server.connect().await;
    send_json(&mut client, serde_json::json!({"type": "offer", "sdp": "v=0"})).await;
    recv_json(&mut client).await;

    let registry = server.registry.clone();
    assert_eq!(registry.len(), 1);

    client.close(None).await.unwrap();
    assert!(eventually(|| registry.is_empty()).await);
    assert!(eventually(|| factory.log.lock().closed == 1).await);

    server.stop().await;
}

/// Test: upgrades on another path are refused
#[tokio::test]
async fn test_wrong_path_rejected() {
    let server = TestServer::start(FakeFactory::new()).await;

    let result = connect_async(server.url("/other")).await;
    assert!(result.is_err(), "Upgrade on the wrong path should fail");
    assert!(server.registry.is_empty());

    server.stop().await;
}

/// Test: shutdown tears down live sessions
#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let factory = FakeFactory::new();
    let server = TestServer::start(factory.clone()).await;

    let mut client = server.connect().await;
    send_json(&mut client, serde_json::json!({"type": "offer", "sdp": "v=0"})).await;
    recv_json(&mut client).await;

    // stop() returns only after connection tasks have drained
    server.stop().await;
    assert_eq!(factory.log.lock().closed, 1);
}

/// Test: shutdown does not wait on a client that never answers the close
#[tokio::test]
async fn test_shutdown_with_stuck_negotiation() {
    let factory = FakeFactory::new();
    let server = TestServer::start(factory.clone()).await;

    let mut client = server.connect().await;
    send_json(&mut client, serde_json::json!({"type": "offer", "sdp": "v=0 hang"})).await;
    assert!(eventually(|| factory.log.lock().created == 1).await);

    tokio::time::timeout(Duration::from_secs(3), server.stop())
        .await
        .expect("shutdown should not hang on a stuck engine call");
    assert_eq!(factory.log.lock().closed, 1);
}
