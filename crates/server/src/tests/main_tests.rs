use std::time::Duration;

use axum::{body, body::Body, http::Request};
use hub::HubConfig;
use storage::{GroupRecord, HubSnapshot, JsonFileStore};
use tokio_tungstenite::{connect_async, tungstenite::Message as TungMessage};
use tower::ServiceExt;

use super::*;

fn memory_settings() -> Settings {
    Settings {
        snapshot_url: "memory".into(),
        ..Settings::default()
    }
}

async fn test_state() -> Arc<AppState> {
    let (state, _store) = start_hub(&memory_settings()).await.expect("hub");
    state
}

async fn join(state: &AppState, name: &str) -> ConnectionId {
    let connection = ConnectionId::new();
    drop(state.connections.attach(connection));
    state.hub.join(connection, name).await.expect("join");
    connection
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::get(uri).body(Body::empty()).expect("request");
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, serde_json::from_slice(&body).expect("json"))
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = build_router(test_state().await);
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn presence_route_lists_online_names() {
    let state = test_state().await;
    join(&state, "bob").await;
    join(&state, "alice").await;

    let (status, body) = get_json(build_router(state), "/api/presence").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "onlineNames": ["alice", "bob"] }));
}

#[tokio::test]
async fn groups_route_marks_viewer_membership() {
    let state = test_state().await;
    let alice = join(&state, "alice").await;
    state.hub.create_group(alice, "ops").await.expect("create");
    join(&state, "bob").await;
    let app = build_router(state);

    let (status, body) = get_json(app.clone(), "/api/groups").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        serde_json::json!([
            { "name": "General", "memberCount": 2, "joined": false },
            { "name": "ops", "memberCount": 1, "joined": false },
        ])
    );

    let (_, body) = get_json(app.clone(), "/api/groups?viewer=bob").await;
    assert_eq!(body[0]["joined"], true);
    assert_eq!(body[1]["joined"], false);

    let (status, body) = get_json(app, "/api/groups?viewer=%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
}

#[tokio::test]
async fn members_route_reports_missing_groups() {
    let state = test_state().await;
    join(&state, "alice").await;
    let app = build_router(state);

    let (status, body) = get_json(app.clone(), "/api/groups/General/members").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!(["alice"]));

    let (status, body) = get_json(app, "/api/groups/nowhere/members").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
    assert_eq!(body["message"], "Group \"nowhere\" does not exist.");
}

#[tokio::test]
async fn start_hub_restores_persisted_groups() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("hub.json");

    let mut snapshot = HubSnapshot::default();
    snapshot.groups.insert(
        GroupName::parse("ops").expect("group"),
        GroupRecord {
            members: vec![DisplayName::parse("alice").expect("name")],
            messages: Vec::new(),
        },
    );
    JsonFileStore::new(path.clone())
        .save(&snapshot)
        .await
        .expect("seed snapshot");

    let settings = Settings {
        snapshot_url: format!("json://{}", path.display()),
        ..Settings::default()
    };
    let (state, store) = start_hub(&settings).await.expect("hub");
    assert!(store.describe().contains("hub.json"));

    let names: Vec<_> = state
        .hub
        .list_groups(None)
        .await
        .into_iter()
        .map(|g| g.name.to_string())
        .collect();
    assert_eq!(names, ["General", "ops"]);
}

#[tokio::test]
async fn start_hub_refuses_corrupt_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("hub.json");
    std::fs::write(&path, "{ not json").expect("write");

    let settings = Settings {
        snapshot_url: path.display().to_string(),
        ..Settings::default()
    };
    assert!(start_hub(&settings).await.is_err());
}

type ClientSocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn serve(state: Arc<AppState>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, build_router(state))
            .await
            .expect("serve");
    });
    addr
}

async fn connect(addr: SocketAddr) -> ClientSocket {
    let (socket, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect");
    socket
}

async fn send(socket: &mut ClientSocket, request: serde_json::Value) {
    socket
        .send(TungMessage::Text(request.to_string()))
        .await
        .expect("send");
}

/// Reads events until one of type `wanted` arrives.
async fn next_event(socket: &mut ClientSocket, wanted: &str) -> serde_json::Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let frame = socket.next().await.expect("open").expect("frame");
            if let TungMessage::Text(text) = frame {
                let event: serde_json::Value = serde_json::from_str(&text).expect("json");
                if event["type"] == wanted {
                    return event;
                }
            }
        }
    })
    .await
    .expect("event in time")
}

#[tokio::test]
async fn websocket_join_and_group_message_round_trip() {
    let state = test_state().await;
    let hub = state.hub.clone();
    let addr = serve(state).await;

    let mut alice = connect(addr).await;
    send(&mut alice, serde_json::json!({ "type": "join", "payload": { "name": "alice" } })).await;
    let list = next_event(&mut alice, "chat_list").await;
    assert_eq!(list["payload"]["groups"][0]["name"], "General");
    assert_eq!(list["payload"]["groups"][0]["joined"], true);

    let mut bob = connect(addr).await;
    send(&mut bob, serde_json::json!({ "type": "join", "payload": { "name": "bob" } })).await;
    next_event(&mut bob, "chat_list").await;
    let presence = next_event(&mut alice, "presence").await;
    assert_eq!(presence["payload"]["onlineNames"], serde_json::json!(["alice"]));
    let presence = next_event(&mut alice, "presence").await;
    assert_eq!(presence["payload"]["onlineNames"], serde_json::json!(["alice", "bob"]));

    send(
        &mut bob,
        serde_json::json!({ "type": "send_group", "payload": { "group": "General", "text": "hi all" } }),
    )
    .await;
    for socket in [&mut alice, &mut bob] {
        loop {
            let event = next_event(socket, "group_message").await;
            if event["payload"]["system"] != true {
                assert_eq!(event["payload"]["user"], "bob");
                assert_eq!(event["payload"]["text"], "hi all");
                break;
            }
        }
    }

    send(&mut bob, serde_json::json!({ "type": "join_group", "payload": { "name": "nowhere" } })).await;
    let toast = next_event(&mut bob, "toast").await;
    assert_eq!(toast["payload"]["text"], "Group \"nowhere\" does not exist.");

    bob.close(None).await.expect("close");
    let presence = next_event(&mut alice, "presence").await;
    assert_eq!(presence["payload"]["onlineNames"], serde_json::json!(["alice"]));
    assert_eq!(
        hub.list_online().await,
        vec![DisplayName::parse("alice").expect("name")]
    );
}

#[tokio::test]
async fn websocket_rejects_garbage_with_toast() {
    let addr = serve(test_state().await).await;
    let mut socket = connect(addr).await;

    socket
        .send(TungMessage::Text("definitely not json".into()))
        .await
        .expect("send");
    let toast = next_event(&mut socket, "toast").await;
    assert_eq!(toast["payload"]["text"], "Invalid request.");

    send(
        &mut socket,
        serde_json::json!({ "type": "send_group", "payload": { "group": "General", "text": "hi" } }),
    )
    .await;
    let toast = next_event(&mut socket, "toast").await;
    assert_eq!(toast["payload"]["text"], "Join with a display name first.");
}

#[tokio::test]
async fn websocket_answers_bare_chat_list_request() {
    let addr = serve(test_state().await).await;
    let mut socket = connect(addr).await;
    send(&mut socket, serde_json::json!({ "type": "join", "payload": { "name": "alice" } })).await;
    next_event(&mut socket, "chat_list").await;

    send(&mut socket, serde_json::json!({ "type": "get_chat_list" })).await;
    let list = next_event(&mut socket, "chat_list").await;
    assert_eq!(list["payload"]["groups"][0]["name"], "General");
    assert_eq!(list["payload"]["groups"][0]["joined"], true);
}

#[test]
fn default_hub_config_matches_settings() {
    let config = Settings::default().hub_config().expect("config");
    let defaults = HubConfig::default();
    assert_eq!(config.history_capacity, defaults.history_capacity);
    assert_eq!(config.default_group, defaults.default_group);
}
