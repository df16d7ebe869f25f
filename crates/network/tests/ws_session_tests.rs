//! End-to-end WebSocket session tests against a live server.

use boardsync_engine::EngineConfig;
use boardsync_network::{CollabServer, ServerConfig};
use boardsync_persistence::{DocumentStore, MemoryCacheStore, MemoryDocumentStore};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

struct TestServer {
    address: SocketAddr,
    docs: Arc<MemoryDocumentStore>,
    _handle: tokio::task::JoinHandle<()>,
}

fn start_server() -> TestServer {
    let cache = Arc::new(MemoryCacheStore::new());
    let docs = Arc::new(MemoryDocumentStore::new());
    let server = CollabServer::new(
        ServerConfig::default(),
        cache,
        docs.clone(),
        EngineConfig::for_tests(),
    );
    let (address, handle) = server.spawn_for_tests().unwrap();
    TestServer {
        address,
        docs,
        _handle: handle,
    }
}

struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    async fn connect(address: SocketAddr) -> Self {
        let (ws, _) = connect_async(format!("ws://{address}/ws"))
            .await
            .expect("websocket connect");
        Self { ws }
    }

    async fn send(&mut self, frame: Value) {
        self.ws
            .send(Message::Text(frame.to_string()))
            .await
            .expect("send frame");
    }

    async fn next_event(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.ws.next())
                .await
                .expect("timed out waiting for frame")
                .expect("socket closed")
                .expect("socket error");
            match frame {
                Message::Text(text) => return serde_json::from_str(&text).expect("frame is JSON"),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    /// Reads frames until one with the given event name arrives, skipping
    /// unrelated traffic (presence churn, lock broadcasts).
    async fn recv_until(&mut self, event: &str) -> Value {
        for _ in 0..128 {
            let frame = self.next_event().await;
            if frame["event"] == event {
                return frame;
            }
        }
        panic!("never received {event}");
    }

    async fn authenticate(&mut self, user_id: &str, user_name: &str) {
        self.send(json!({
            "event": "authenticate",
            "data": {"userId": user_id, "userName": user_name}
        }))
        .await;
        let reply = self.recv_until("authenticated").await;
        assert_eq!(reply["data"]["success"], true);
    }

    async fn join(&mut self, diagram: &str) -> Value {
        self.send(json!({
            "event": "join_project",
            "data": {"diagramId": diagram}
        }))
        .await;
        self.recv_until("state_sync").await
    }

    async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

fn create_entity_op(op_id: &str, entity_id: &str, name: &str) -> Value {
    json!({
        "event": "operation",
        "data": {
            "id": op_id,
            "type": "ENTITY_CREATE",
            "payload": {
                "id": entity_id,
                "name": name,
                "position": {"x": 0.0, "y": 0.0},
                "attributes": [
                    {"id": format!("{entity_id}-a1"), "name": "id", "type": "INT", "isPK": true, "isFK": false}
                ]
            },
            "lamportClock": 1,
            "wallClock": 1000,
            "userId": "ignored",
            "userName": "ignored"
        }
    })
}

#[tokio::test]
async fn late_joiner_sees_prior_edits_and_author_gets_no_echo() {
    let server = start_server();

    let mut alice = Client::connect(server.address).await;
    alice.authenticate("u-alice", "Alice").await;
    let sync = alice.join("proj_demo").await;
    assert_eq!(sync["data"]["state"]["version"], 0);
    assert_eq!(sync["data"]["state"]["entities"], json!([]));

    alice.send(create_entity_op("op-1", "e1", "users")).await;

    // Rejoining runs the leave path behind the diagram's queue, so this
    // second state_sync is ordered after the operation above.
    let sync = alice.join("proj_demo").await;
    assert_eq!(sync["data"]["state"]["version"], 1);

    let mut bob = Client::connect(server.address).await;
    bob.authenticate("u-bob", "Bob").await;
    let sync = bob.join("proj_demo").await;
    assert_eq!(sync["data"]["state"]["version"], 1);
    assert_eq!(sync["data"]["state"]["entities"][0]["id"], "e1");
    assert_eq!(sync["data"]["onlineUsers"].as_array().unwrap().len(), 2);

    // Bob edits; Alice receives the fan-out, stamped with Bob's identity.
    bob.send(create_entity_op("op-2", "e2", "orders")).await;
    let broadcast = alice.recv_until("operation").await;
    assert_eq!(broadcast["data"]["id"], "op-2");
    assert_eq!(broadcast["data"]["type"], "ENTITY_CREATE");
    assert_eq!(broadcast["data"]["userId"], "u-bob");
    assert_eq!(broadcast["data"]["version"], 2);
    assert!(broadcast["data"]["appliedAt"].as_u64().unwrap() > 0);

    alice.close().await;
    bob.close().await;
}

#[tokio::test]
async fn lock_acquire_conflict_and_result_routing() {
    let server = start_server();

    let mut alice = Client::connect(server.address).await;
    alice.authenticate("u-alice", "Alice").await;
    alice.join("proj_demo").await;

    let mut bob = Client::connect(server.address).await;
    bob.authenticate("u-bob", "Bob").await;
    bob.join("proj_demo").await;

    alice
        .send(json!({"event": "request_lock", "data": {"entityId": "e1"}}))
        .await;
    let result = alice.recv_until("lock_result").await;
    assert_eq!(result["data"]["success"], true);

    // Everyone (including the caller) learns about the grant.
    let acquired = bob.recv_until("lock_acquired").await;
    assert_eq!(acquired["data"]["entityId"], "e1");
    assert_eq!(acquired["data"]["lock"]["userId"], "u-alice");

    // Bob is refused and told the holder; no broadcast is emitted.
    bob.send(json!({"event": "request_lock", "data": {"entityId": "e1"}}))
        .await;
    let refused = bob.recv_until("lock_result").await;
    assert_eq!(refused["data"]["success"], false);
    assert_eq!(refused["data"]["holder"]["userId"], "u-alice");

    // Release by the holder reaches the other session.
    alice
        .send(json!({"event": "release_lock", "data": {"entityId": "e1"}}))
        .await;
    let released = bob.recv_until("lock_released").await;
    assert_eq!(released["data"]["entityId"], "e1");
    assert_eq!(released["data"]["userId"], "u-alice");

    alice.close().await;
    bob.close().await;
}

#[tokio::test]
async fn disconnect_releases_locks_flushes_and_notifies() {
    let server = start_server();

    let mut alice = Client::connect(server.address).await;
    alice.authenticate("u-alice", "Alice").await;
    alice.join("diagram-7").await;

    let mut bob = Client::connect(server.address).await;
    bob.authenticate("u-bob", "Bob").await;
    bob.join("diagram-7").await;
    alice.recv_until("user_joined").await;

    for entity in ["e1", "e2", "e3"] {
        alice
            .send(json!({"event": "request_lock", "data": {"entityId": entity}}))
            .await;
        alice.recv_until("lock_result").await;
    }
    alice.send(create_entity_op("op-1", "e1", "users")).await;
    bob.recv_until("operation").await;

    alice.close().await;

    let left = bob.recv_until("user_left").await;
    assert_eq!(left["data"]["userId"], "u-alice");
    assert_eq!(left["data"]["onlineUsers"].as_array().unwrap().len(), 1);

    // The pending debounce was flushed on disconnect.
    let stored = server
        .docs
        .load_diagram(&boardsync_core::DiagramId::new("diagram-7"))
        .await
        .unwrap()
        .expect("diagram persisted on disconnect");
    assert_eq!(stored.version, 1);

    // Alice's locks are gone: Bob can take one immediately.
    bob.send(json!({"event": "request_lock", "data": {"entityId": "e2"}}))
        .await;
    let result = bob.recv_until("lock_result").await;
    assert_eq!(result["data"]["success"], true);

    bob.close().await;
}

#[tokio::test]
async fn cursor_updates_fan_out_with_author_identity() {
    let server = start_server();

    let mut alice = Client::connect(server.address).await;
    alice.authenticate("u-alice", "Alice").await;
    alice.join("proj_demo").await;

    let mut bob = Client::connect(server.address).await;
    bob.authenticate("u-bob", "Bob").await;
    bob.join("proj_demo").await;

    bob.send(json!({
        "event": "cursor_move",
        "data": {"x": 120.5, "y": 80.0, "viewport": {"x": 0.0, "y": 0.0, "zoom": 1.5}}
    }))
    .await;

    let update = alice.recv_until("cursor_update").await;
    assert_eq!(update["data"]["userId"], "u-bob");
    assert_eq!(update["data"]["userName"], "Bob");
    assert_eq!(update["data"]["x"], 120.5);
    assert_eq!(update["data"]["viewport"]["zoom"], 1.5);

    alice.close().await;
    bob.close().await;
}

#[tokio::test]
async fn operations_without_a_room_or_with_bad_shapes_are_rejected() {
    let server = start_server();

    let mut client = Client::connect(server.address).await;
    client.authenticate("u1", "User").await;

    // No join yet.
    client.send(create_entity_op("op-1", "e1", "users")).await;
    let rejected = client.recv_until("op_rejected").await;
    assert_eq!(rejected["data"]["operationId"], "op-1");

    client.join("proj_demo").await;

    // Unknown operation type.
    client
        .send(json!({
            "event": "operation",
            "data": {
                "id": "op-2",
                "type": "ENTITY_EXPLODE",
                "lamportClock": 1,
                "wallClock": 1
            }
        }))
        .await;
    let rejected = client.recv_until("op_rejected").await;
    assert!(rejected["data"]["reason"]
        .as_str()
        .unwrap()
        .contains("unrecognized"));

    // Missing target where one is required.
    client
        .send(json!({
            "event": "operation",
            "data": {
                "id": "op-3",
                "type": "ENTITY_DELETE",
                "lamportClock": 1,
                "wallClock": 1
            }
        }))
        .await;
    let rejected = client.recv_until("op_rejected").await;
    assert_eq!(rejected["data"]["operationId"], "op-3");

    client.close().await;
}

#[tokio::test]
async fn unauthenticated_sessions_edit_as_anonymous() {
    let server = start_server();

    let mut ghost = Client::connect(server.address).await;
    ghost.join("proj_demo").await;

    let mut witness = Client::connect(server.address).await;
    witness.authenticate("u-w", "Witness").await;
    witness.join("proj_demo").await;

    ghost.send(create_entity_op("op-1", "e1", "users")).await;
    let broadcast = witness.recv_until("operation").await;
    assert_eq!(broadcast["data"]["userId"], "anonymous");

    ghost.close().await;
    witness.close().await;
}

#[tokio::test]
async fn fifty_sessions_all_receive_every_broadcast() {
    let server = start_server();

    let mut author = Client::connect(server.address).await;
    author.authenticate("u-author", "Author").await;
    author.join("proj_bus").await;

    let mut listeners = Vec::new();
    for i in 0..50 {
        let mut listener = Client::connect(server.address).await;
        listener.authenticate(&format!("u-{i}"), &format!("L{i}")).await;
        listener.join("proj_bus").await;
        listeners.push(listener);
    }

    for n in 0..3 {
        author
            .send(create_entity_op(
                &format!("op-{n}"),
                &format!("e{n}"),
                &format!("table_{n}"),
            ))
            .await;
    }

    for listener in &mut listeners {
        for n in 0..3 {
            let broadcast = listener.recv_until("operation").await;
            assert_eq!(broadcast["data"]["id"], format!("op-{n}"));
        }
    }

    author.close().await;
    for listener in listeners {
        listener.close().await;
    }
}

#[tokio::test]
async fn ten_mebibyte_import_succeeds_end_to_end() {
    let server = start_server();

    let mut author = Client::connect(server.address).await;
    author.authenticate("u-author", "Author").await;
    author.join("diagram-big").await;

    let mut witness = Client::connect(server.address).await;
    witness.authenticate("u-w", "Witness").await;
    witness.join("diagram-big").await;

    // ~300 entities × ~36 KiB comment ≈ 11 MiB of payload.
    let filler = "x".repeat(36 * 1024);
    let entities: Vec<Value> = (0..300)
        .map(|i| {
            json!({
                "id": format!("e{i}"),
                "name": format!("table_{i}"),
                "position": {"x": 0.0, "y": 0.0},
                "attributes": [],
                "comment": filler
            })
        })
        .collect();
    let frame = json!({
        "event": "operation",
        "data": {
            "id": "op-import",
            "type": "ERD_IMPORT",
            "payload": {"overwrite": true, "entities": entities, "relationships": []},
            "lamportClock": 1,
            "wallClock": 1
        }
    });
    assert!(frame.to_string().len() > 10 * 1024 * 1024);
    author.send(frame).await;

    let broadcast = witness.recv_until("operation").await;
    assert_eq!(broadcast["data"]["type"], "ERD_IMPORT");
    assert_eq!(
        broadcast["data"]["payload"]["entities"]
            .as_array()
            .unwrap()
            .len(),
        300
    );

    // Rejoin to barrier on the pipeline, then check the durable copy.
    author.join("diagram-big").await;

    // Imports are critical: the durable copy is written without debounce.
    let stored = server
        .docs
        .load_diagram(&boardsync_core::DiagramId::new("diagram-big"))
        .await
        .unwrap()
        .expect("import persisted");
    assert_eq!(stored.entities.len(), 300);

    author.close().await;
    witness.close().await;
}
