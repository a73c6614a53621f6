//! HTTP and WebSocket handlers for the roomcast server.
//!
//! - `POST /create-room` creates a room and returns its code.
//! - `GET /join-room/:id` upgrades to a WebSocket and joins the room.
//! - `GET /health` reports liveness.

use crate::config::Config;
use crate::console::Console;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, Request, State,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use roomcast_core::{AdminInspector, ClientExit, RegistryError, RoomHandle, RoomRegistry};
use roomcast_transport::WebSocketConnection;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Live rooms.
    pub registry: RoomRegistry,
    /// Read-only view for operators.
    pub inspector: AdminInspector,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let registry = RoomRegistry::with_config(config.registry_config());
        Self {
            inspector: AdminInspector::new(registry.clone()),
            registry,
            config,
        }
    }
}

/// Errors returned by the HTTP surface.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Registry lookup or creation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// `/join-room` was requested without WebSocket upgrade headers.
    #[error("WebSocket upgrade required")]
    UpgradeRequired,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Registry(RegistryError::RoomNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Registry(RegistryError::EmptyRoomCode | RegistryError::InvalidRoomCode(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Registry(RegistryError::RoomAlreadyExists(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Registry(RegistryError::TooManyRooms(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpgradeRequired => StatusCode::UPGRADE_REQUIRED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            metrics::record_error(match &self {
                Self::Registry(RegistryError::TooManyRooms(_)) => "room_limit",
                _ => "room_collision",
            });
            warn!(error = %self, "Request failed");
        } else {
            debug!(error = %self, "Request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

/// Body of a successful `POST /create-room`.
#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    /// Code clients use to join.
    pub code: String,
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/create-room", post(create_room_handler))
        .route("/join-room", get(blank_join_handler))
        .route("/join-room/", get(blank_join_handler))
        .route("/join-room/:id", get(join_room_handler))
        .route("/health", get(health_handler))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Log method, path, status and handling time of every request.
async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed = ?start.elapsed(),
        "HTTP request"
    );
    response
}

/// Run the HTTP/WebSocket server until Ctrl-C or the console `exit` command.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));
    let shutdown = Arc::new(Notify::new());

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }
    let sampler = metrics::spawn_sampler(state.inspector.clone(), metrics::SAMPLE_INTERVAL);

    if config.console.enabled {
        let console = Console::new(state.registry.clone(), state.inspector.clone());
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if console.run_stdin().await {
                shutdown.notify_one();
            }
        });
    }

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("roomcast listening on {}", addr);
    info!("Create rooms with POST http://{}/create-room", addr);
    info!("Join rooms at ws://{}/join-room/<code>", addr);

    let registry = state.registry.clone();
    serve(listener, state, shutdown_signal(shutdown, registry)).await?;

    sampler.abort();
    info!("roomcast stopped");
    Ok(())
}

/// Serve `state` on `listener` until `signal` resolves.
///
/// # Errors
///
/// Returns an error if accepting connections fails.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    signal: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal)
    .await?;
    Ok(())
}

/// Resolves on Ctrl-C or console `exit`, after closing every room.
async fn shutdown_signal(console_exit: Arc<Notify>, registry: RoomRegistry) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Received Ctrl-C");
        }
        () = console_exit.notified() => {
            info!("Exit requested from console");
        }
    }

    registry.shutdown();
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": state.registry.len(),
    }))
}

/// Create a room with a fresh code.
async fn create_room_handler(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), ApiError> {
    let room = state.registry.create_with_generated_code()?;
    info!(room = %room.code(), "Room created via HTTP");

    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            code: room.code().to_string(),
        }),
    ))
}

/// `/join-room` with no code.
async fn blank_join_handler() -> ApiError {
    ApiError::Registry(RegistryError::EmptyRoomCode)
}

/// Resolve the room, then upgrade and join it.
///
/// The room is resolved before the upgrade so unknown codes are rejected
/// without opening a WebSocket.
async fn join_room_handler(
    Path(id): Path<String>,
    ws: Option<WebSocketUpgrade>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let room = state.registry.resolve(&id)?;
    let ws = ws.ok_or(ApiError::UpgradeRequired)?;
    let max_message_size = state.config.limits.max_message_size;

    Ok(ws
        .max_message_size(max_message_size)
        .on_failed_upgrade(move |e| {
            warn!(remote = %remote, error = %e, "WebSocket upgrade failed");
            metrics::record_error("upgrade");
        })
        .on_upgrade(move |socket| handle_socket(socket, remote, room, max_message_size)))
}

/// Drive one upgraded connection for its whole life in `room`.
async fn handle_socket(socket: WebSocket, remote: SocketAddr, room: RoomHandle, max_message_size: usize) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection = WebSocketConnection::new(socket, remote, max_message_size);
    let membership = match room.attach(Box::new(connection)) {
        Ok(membership) => membership,
        Err(e) => {
            debug!(remote = %remote, error = %e, "Room closed before join");
            return;
        }
    };

    let client_id = membership.client().id().clone();
    info!(room = %room.code(), client = %client_id, remote = %remote, "Client joined");

    match membership.run().await {
        ClientExit::ReadFailed(e) => {
            warn!(room = %room.code(), client = %client_id, error = %e, "Client read failed");
            metrics::record_error("read");
        }
        exit => {
            debug!(room = %room.code(), client = %client_id, ?exit, "Client receive loop ended");
        }
    }

    info!(room = %room.code(), client = %client_id, "Client left");
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use roomcast_core::RoomCode;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::{self, Message};

    struct TestServer {
        addr: SocketAddr,
        registry: RoomRegistry,
        stop: Arc<Notify>,
    }

    impl TestServer {
        async fn start() -> Self {
            let config = Config {
                port: 0,
                ..Config::default()
            };
            let state = Arc::new(AppState::new(config));
            let registry = state.registry.clone();
            let stop = Arc::new(Notify::new());

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let signal = shutdown_signal_for_tests(Arc::clone(&stop), registry.clone());
            tokio::spawn(serve(listener, state, signal));

            Self { addr, registry, stop }
        }

        fn http(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }

        fn ws(&self, path: &str) -> String {
            format!("ws://{}{}", self.addr, path)
        }

        async fn create_room(&self) -> String {
            let response = reqwest::Client::new()
                .post(self.http("/create-room"))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::CREATED);
            let body: serde_json::Value = response.json().await.unwrap();
            body["code"].as_str().unwrap().to_string()
        }

        async fn wait_for_members(&self, code: &str, count: usize) {
            let code = RoomCode::parse(code).unwrap();
            for _ in 0..200 {
                if self.registry.lookup(&code).map(|r| r.member_count()) == Some(count) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("room {code} never reached {count} members");
        }
    }

    async fn shutdown_signal_for_tests(stop: Arc<Notify>, registry: RoomRegistry) {
        stop.notified().await;
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_create_room_returns_code() {
        let server = TestServer::start().await;
        let code = server.create_room().await;

        assert_eq!(code.len(), 6);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert!(server.registry.contains(&RoomCode::parse(&code).unwrap()));
    }

    #[tokio::test]
    async fn test_create_room_over_limit_is_unavailable() {
        let config = Config {
            limits: crate::config::LimitsConfig {
                max_rooms: 1,
                ..Default::default()
            },
            ..Config::default()
        };
        let state = Arc::new(AppState::new(config));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state, std::future::pending()));

        let client = reqwest::Client::new();
        let url = format!("http://{addr}/create-room");
        assert_eq!(client.post(&url).send().await.unwrap().status(), 201);
        assert_eq!(client.post(&url).send().await.unwrap().status(), 503);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_others_not_sender() {
        let server = TestServer::start().await;
        let code = server.create_room().await;
        let path = format!("/join-room/{code}");

        let (mut first, _) = tokio_tungstenite::connect_async(server.ws(&path)).await.unwrap();
        let (mut second, _) = tokio_tungstenite::connect_async(server.ws(&path)).await.unwrap();
        server.wait_for_members(&code, 2).await;

        first.send(Message::Text("hello".into())).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), second.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(received, Message::Text("hello".into()));

        let echo = tokio::time::timeout(Duration::from_millis(200), first.next()).await;
        assert!(echo.is_err(), "sender must not receive its own message");
    }

    #[tokio::test]
    async fn test_join_code_is_case_insensitive() {
        let server = TestServer::start().await;
        let code = server.create_room().await;

        let path = format!("/join-room/{}", code.to_lowercase());
        let (_socket, _) = tokio_tungstenite::connect_async(server.ws(&path)).await.unwrap();
        server.wait_for_members(&code, 1).await;
    }

    #[tokio::test]
    async fn test_join_unknown_room_is_not_found() {
        let server = TestServer::start().await;

        let err = tokio_tungstenite::connect_async(server.ws("/join-room/NOPE42"))
            .await
            .unwrap_err();
        match err {
            tungstenite::Error::Http(response) => assert_eq!(response.status(), 404),
            other => panic!("unexpected error: {other}"),
        }

        let status = reqwest::get(server.http("/join-room/NOPE42")).await.unwrap().status();
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn test_join_blank_code_is_bad_request() {
        let server = TestServer::start().await;

        for path in ["/join-room/", "/join-room", "/join-room/%20%20"] {
            let status = reqwest::get(server.http(path)).await.unwrap().status();
            assert_eq!(status, 400, "path {path}");
        }
    }

    #[tokio::test]
    async fn test_join_without_upgrade_requires_upgrade() {
        let server = TestServer::start().await;
        let code = server.create_room().await;

        let status = reqwest::get(server.http(&format!("/join-room/{code}")))
            .await
            .unwrap()
            .status();
        assert_eq!(status, 426);
    }

    #[tokio::test]
    async fn test_disconnect_leaves_room() {
        let server = TestServer::start().await;
        let code = server.create_room().await;
        let path = format!("/join-room/{code}");

        let (mut first, _) = tokio_tungstenite::connect_async(server.ws(&path)).await.unwrap();
        let (_second, _) = tokio_tungstenite::connect_async(server.ws(&path)).await.unwrap();
        server.wait_for_members(&code, 2).await;

        first.close(None).await.unwrap();
        server.wait_for_members(&code, 1).await;
    }

    #[tokio::test]
    async fn test_deleted_room_closes_clients() {
        let server = TestServer::start().await;
        let code = server.create_room().await;
        let (mut socket, _) =
            tokio_tungstenite::connect_async(server.ws(&format!("/join-room/{code}")))
                .await
                .unwrap();
        server.wait_for_members(&code, 1).await;

        server.registry.delete(&RoomCode::parse(&code).unwrap());

        let next = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .unwrap();
        assert!(matches!(next, Some(Ok(Message::Close(_))) | None | Some(Err(_))));

        let status = reqwest::get(server.http(&format!("/join-room/{code}")))
            .await
            .unwrap()
            .status();
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn test_health() {
        let server = TestServer::start().await;
        server.create_room().await;

        let body: serde_json::Value = reqwest::get(server.http("/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["rooms"], 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_rooms() {
        let server = TestServer::start().await;
        server.create_room().await;
        server.create_room().await;

        server.stop.notify_one();
        for _ in 0..200 {
            if server.registry.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("rooms survived shutdown");
    }
}
