use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use brain_core::Role;
use brain_telemetry::metrics::MetricsRecorder;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::connection::{self, SessionConfig};
use crate::errors::ServerError;
use crate::health::health_check;
use crate::hub::Hub;
use crate::shutdown::{ShutdownCoordinator, DEFAULT_SHUTDOWN_TIMEOUT};

pub const ROBOT_PATH: &str = "/ws/robot";
pub const CLIENT_PATH: &str = "/ws/client";

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Silence tolerated on the robot link before the session is dropped.
    pub robot_timeout: Duration,
    /// Outbound queue depth per connection.
    pub send_queue: usize,
    /// Ping cadence towards frontends.
    pub heartbeat_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            robot_timeout: Duration::from_secs(2),
            send_queue: 256,
            heartbeat_interval: Duration::from_secs(30),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub sessions: SessionConfig,
    pub shutdown: ShutdownCoordinator,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(hub: Arc<Hub>, sessions: SessionConfig, shutdown: ShutdownCoordinator) -> Self {
        Self {
            hub,
            sessions,
            shutdown,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(ROBOT_PATH, get(robot_ws_handler))
        .route(CLIENT_PATH, get(client_ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind, start serving in the background, and return a handle to stop it.
pub async fn start(
    config: ServerConfig,
    metrics: Arc<MetricsRecorder>,
) -> Result<ServerHandle, ServerError> {
    let hub = Arc::new(Hub::new(config.send_queue, metrics));
    let coordinator = ShutdownCoordinator::new();
    let sessions = SessionConfig {
        robot_timeout: config.robot_timeout,
        heartbeat_interval: config.heartbeat_interval,
    };
    let router = build_router(AppState::new(
        Arc::clone(&hub),
        sessions,
        coordinator.clone(),
    ));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| ServerError::Bind { addr, source })?;

    info!(
        addr = %local_addr,
        robot_timeout_ms = config.robot_timeout.as_millis() as u64,
        "brain hub listening"
    );

    let token = coordinator.token();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(token.cancelled_owned())
            .await
        {
            error!(error = %e, "server terminated with error");
        }
    });

    Ok(ServerHandle {
        addr: local_addr,
        hub,
        coordinator,
        shutdown_timeout: config.shutdown_timeout,
        server,
    })
}

/// Handle returned by `start()`. Dropping it leaves the server running;
/// call [`shutdown`](Self::shutdown) to stop it.
pub struct ServerHandle {
    addr: SocketAddr,
    hub: Arc<Hub>,
    coordinator: ShutdownCoordinator,
    shutdown_timeout: Duration,
    server: JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Stop accepting, end every session, and wait (bounded) for them.
    pub async fn shutdown(self) {
        info!(sessions = self.coordinator.active_sessions(), "shutting down");
        self.coordinator
            .graceful_shutdown(vec![self.server], Some(self.shutdown_timeout))
            .await;
        info!("shutdown complete");
    }
}

async fn robot_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let token = state.shutdown.token();
        let session = connection::serve_robot(socket, state.hub, state.sessions, token);
        run_session(&state.shutdown, Role::Robot, session).await;
    })
}

async fn client_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let token = state.shutdown.token();
        let session = connection::serve_frontend(socket, state.hub, state.sessions, token);
        run_session(&state.shutdown, Role::Frontend, session).await;
    })
}

/// Run a session as a tracked task. Returns `false` if the task panicked or
/// was aborted.
async fn run_session<F>(shutdown: &ShutdownCoordinator, role: Role, session: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    match shutdown.track(session).await {
        Ok(()) => true,
        Err(e) => {
            error!(role = %role, error = %e, "session task failed");
            false
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(health_check(&state.hub, state.start_time, state.started_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.robot_timeout, Duration::from_secs(2));
        assert_eq!(config.send_queue, 256);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn start_binds_ephemeral_port_and_stops() {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        };
        let handle = start(config, Arc::new(MetricsRecorder::new()))
            .await
            .unwrap();
        assert_ne!(handle.port(), 0);
        assert!(handle.addr().ip().is_loopback());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn finished_session_is_ok() {
        let shutdown = ShutdownCoordinator::new();
        assert!(run_session(&shutdown, Role::Frontend, async {}).await);
    }

    #[tokio::test]
    async fn panicking_session_is_reported() {
        let shutdown = ShutdownCoordinator::new();
        let ok = run_session(&shutdown, Role::Robot, async {
            panic!("session blew up");
        })
        .await;
        assert!(!ok);
        assert_eq!(shutdown.active_sessions(), 0);
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port,
            ..ServerConfig::default()
        };
        let err = start(config, Arc::new(MetricsRecorder::new()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
