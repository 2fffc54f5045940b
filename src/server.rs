use crate::config::{DriverKind, ServerConfig};
use crate::driver::{DeviceDriver, GpioUtilityDriver, MemoryDriver, TimeoutDriver};
use crate::engine::ControlEngine;
use crate::error::LightsError;
use crate::protocol::OutboundMessage;
use crate::registry::{Target, TargetRegistry};
use crate::sessions::{SessionHub, SessionId};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// How long a closing session gets to flush its goodbye.
const GOODBYE_FLUSH: Duration = Duration::from_secs(1);

/// State shared by every connection
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ControlEngine>,
    pub sessions: SessionHub,
}

impl AppState {
    pub fn new(engine: ControlEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            sessions: SessionHub::new(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
    targets: Vec<Target>,
    sessions: usize,
}

/// The control server: owns startup, the listener and shutdown.
pub struct LightServer {
    config: ServerConfig,
}

impl LightServer {
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate().map_err(LightsError::from)?;
        Ok(Self { config })
    }

    fn build_driver(&self) -> Arc<dyn DeviceDriver> {
        let inner: Arc<dyn DeviceDriver> = match self.config.driver {
            DriverKind::Gpio => Arc::new(GpioUtilityDriver::new(
                self.config.gpio_program.clone(),
                &self.config.targets,
            )),
            DriverKind::Memory => Arc::new(MemoryDriver::new()),
        };
        Arc::new(TimeoutDriver::new(inner, self.config.driver_timeout))
    }

    /// Initialise the outputs and build the shared state, without listening.
    pub async fn prepare(&self) -> AppState {
        let driver = self.build_driver();
        let registry = Arc::new(TargetRegistry::new(
            self.config.targets.iter().map(|t| t.name.as_str()),
        ));

        let ready = registry
            .initialize_all(driver.as_ref(), self.config.init_outputs_off)
            .await;
        if ready < registry.names().len() {
            tracing::warn!(
                "{} of {} output(s) failed to initialize",
                registry.names().len() - ready,
                registry.names().len()
            );
        }

        let engine = ControlEngine::new(registry, driver, self.config.settle_delay)
            .with_driver_error_replies(self.config.report_driver_errors);
        AppState::new(engine)
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        tracing::info!("Beginning server start-up");
        let state = self.prepare().await;

        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        tracing::info!("Listening on {}", listener.local_addr()?);
        tracing::info!(
            "Targets: {}",
            state.engine.registry().names().join(", ")
        );

        serve(listener, state, shutdown_signal()).await?;
        tracing::info!("Closing server");
        Ok(())
    }
}

/// Serve the router on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("Server error")?;
    Ok(())
}

/// WebSocket upgrades are accepted on any path, like a bare WebSocket server.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .fallback(handle_websocket)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "lightd".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        targets: state.engine.registry().snapshot().await,
        sessions: state.sessions.count().await,
    })
}

async fn handle_websocket(
    ws: WebSocketUpgrade,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    ws.on_upgrade(move |socket| handle_socket(socket, state, peer))
}

async fn handle_socket(socket: WebSocket, state: AppState, peer: Option<SocketAddr>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    // Forward queued frames to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let session = state.sessions.open(tx, peer).await;
    tracing::info!(session_id = session, "Client connected from {}", describe(peer));
    state
        .sessions
        .reply(session, &OutboundMessage::welcome())
        .await;

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let payload = match msg {
                Message::Text(text) => text.into_bytes(),
                Message::Binary(bytes) => bytes,
                Message::Close(_) => break,
                _ => continue,
            };
            tracing::debug!(session_id = session, "Received {} byte(s)", payload.len());
            // Each request runs on its own so a slow read never holds up
            // this or any other session.
            let state = recv_state.clone();
            tokio::spawn(async move {
                let dispatches = state.engine.handle_payload(&payload, session).await;
                state.sessions.deliver(dispatches).await;
            });
        }
    });

    let socket_gone = tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
            true
        }
        _ = (&mut recv_task) => false,
    };

    close_session(&state, session, peer).await;

    // The hub held the last sender, so the forwarder drains and stops.
    if !socket_gone && tokio::time::timeout(GOODBYE_FLUSH, &mut send_task).await.is_err() {
        send_task.abort();
    }
}

async fn close_session(state: &AppState, session: SessionId, peer: Option<SocketAddr>) {
    tracing::info!(session_id = session, "Client disconnected from {}", describe(peer));
    if !state
        .sessions
        .reply(session, &OutboundMessage::goodbye())
        .await
    {
        tracing::debug!(session_id = session, "Goodbye not delivered");
    }
    state.sessions.close(session).await;
}

fn describe(peer: Option<SocketAddr>) -> String {
    peer.map(|p| p.to_string())
        .unwrap_or_else(|| "unknown peer".to_string())
}
