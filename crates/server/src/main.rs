use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use hub::{spawn_persister, ConnectionTable, Hub, Recipients, Transport};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{ConnectionId, DisplayName, GroupName},
    error::{ApiError, ErrorCode, HubError},
    protocol::{ClientRequest, GroupSummary, ServerEvent},
};
use storage::{open_store, SnapshotStore, StoreLocation};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, Settings};

const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;
const MAX_FRAME_BYTES: usize = 64 * 1024;

struct AppState {
    hub: Arc<Hub>,
    connections: Arc<ConnectionTable>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresenceResponse {
    online_names: Vec<DisplayName>,
}

#[derive(Debug, Deserialize)]
struct GroupsQuery {
    viewer: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let (state, store) = start_hub(&settings).await?;
    let persister = spawn_persister(state.hub.clone(), store.clone());
    let hub = state.hub.clone();
    let app = build_router(state);

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, store = %store.describe(), "hub listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    persister.abort();
    if let Err(error) = hub.flush(store.as_ref()).await {
        error!(%error, "final snapshot failed");
    }
    info!("hub stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "could not listen for ctrl-c; shutting down");
    }
}

/// Opens the configured store and builds a hub restored from it.
async fn start_hub(settings: &Settings) -> anyhow::Result<(Arc<AppState>, Arc<dyn SnapshotStore>)> {
    let location = StoreLocation::parse(&settings.snapshot_url);
    let store = open_store(&location).await.map_err(|error| {
        error!(
            snapshot_url = %settings.snapshot_url,
            error = ?error,
            "failed to open snapshot store; verify the path and permissions"
        );
        error
    })?;

    let connections = Arc::new(ConnectionTable::default());
    let hub = Arc::new(Hub::new(settings.hub_config()?, connections.clone()));

    let snapshot = store
        .load()
        .await
        .with_context(|| format!("failed to read snapshot from {}", store.describe()))?;
    match snapshot {
        Some(snapshot) => hub.restore(snapshot).await,
        None => info!(
            store = %store.describe(),
            default_group = %settings.default_group,
            "no snapshot yet; starting with the default group"
        ),
    }

    Ok((Arc::new(AppState { hub, connections }), store))
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .route("/api/presence", get(api_presence))
        .route("/api/groups", get(api_groups))
        .route("/api/groups/:name/members", get(api_group_members))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn api_presence(State(state): State<Arc<AppState>>) -> Json<PresenceResponse> {
    Json(PresenceResponse {
        online_names: state.hub.list_online().await,
    })
}

async fn api_groups(
    State(state): State<Arc<AppState>>,
    Query(q): Query<GroupsQuery>,
) -> Result<Json<Vec<GroupSummary>>, (StatusCode, Json<ApiError>)> {
    let viewer = q
        .viewer
        .as_deref()
        .map(DisplayName::parse)
        .transpose()
        .map_err(api_error)?;
    Ok(Json(state.hub.list_groups(viewer.as_ref()).await))
}

async fn api_group_members(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<DisplayName>>, (StatusCode, Json<ApiError>)> {
    let group = GroupName::parse(&name).map_err(api_error)?;
    state
        .hub
        .group_members(&group)
        .await
        .map(Json)
        .ok_or_else(|| api_error(HubError::NoSuchGroup(group.to_string())))
}

fn api_error(error: HubError) -> (StatusCode, Json<ApiError>) {
    let status = match error.code() {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiError::from(error)))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let connection = ConnectionId::new();
    let (mut sender, mut receiver) = socket.split();
    let mut outbound = UnboundedReceiverStream::new(state.connections.attach(connection));
    debug!(%connection, "websocket opened");

    let send_task = tokio::spawn(async move {
        while let Some(event) = outbound.next().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(error) => {
                    warn!(%error, event = event.name(), "failed to encode event");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = receiver.next().await {
        match frame {
            WsMessage::Text(text) => handle_frame(&state, connection, &text).await,
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    state.connections.detach(connection);
    state.hub.disconnect(connection).await;
    send_task.abort();
    debug!(%connection, "websocket closed");
}

/// Refusals go back to the sender as a toast; nobody else hears about them.
async fn handle_frame(state: &AppState, connection: ConnectionId, text: &str) {
    let request = match ClientRequest::from_frame(text) {
        Ok(request) => request,
        Err(error) => {
            debug!(%connection, %error, "unparseable client frame");
            state.connections.publish(
                Recipients::Connection(connection),
                ServerEvent::toast("Invalid request."),
            );
            return;
        }
    };

    if let Err(error) = state.hub.handle(connection, request).await {
        debug!(%connection, %error, "request refused");
        state.connections.publish(
            Recipients::Connection(connection),
            ServerEvent::toast(error.to_string()),
        );
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
