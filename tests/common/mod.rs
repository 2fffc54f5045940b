//! Shared helpers for the integration tests: a live server on an ephemeral
//! port with an in-memory driver, and a small WebSocket client.

use futures_util::{SinkExt, StreamExt};
use gpio_lights::driver::MemoryDriver;
use gpio_lights::engine::ControlEngine;
use gpio_lights::registry::TargetRegistry;
use gpio_lights::server::{serve, AppState};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// How long a test waits for a frame that should arrive.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a test waits to be convinced a frame will not arrive.
pub const SILENCE: Duration = Duration::from_millis(300);

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub driver: Arc<MemoryDriver>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Red, yellow and green on a memory driver, with a short settling delay.
    pub async fn start() -> Self {
        Self::start_with(|engine| engine).await
    }

    pub async fn start_with<F>(customize: F) -> Self
    where
        F: FnOnce(ControlEngine) -> ControlEngine,
    {
        let driver = Arc::new(MemoryDriver::new());
        let registry = Arc::new(TargetRegistry::new(["red", "yellow", "green"]));
        let engine = ControlEngine::new(registry, driver.clone(), Duration::from_millis(20));
        let state = AppState::new(customize(engine));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("No local address");

        let (tx, rx) = oneshot::channel::<()>();
        let server_state = state.clone();
        tokio::spawn(async move {
            serve(listener, server_state, async move {
                let _ = rx.await;
            })
            .await
            .expect("Server failed");
        });

        Self {
            addr,
            state,
            driver,
            shutdown: Some(tx),
        }
    }

    /// Connect a client and consume its welcome frame.
    pub async fn connect(&self) -> Client {
        let mut client = self.connect_raw().await;
        let welcome = client.recv().await;
        assert_eq!(welcome["message"], "Welcome!");
        client
    }

    pub async fn connect_raw(&self) -> Client {
        let (ws, _) = connect_async(format!("ws://{}/", self.addr))
            .await
            .expect("Failed to connect");
        Client { ws }
    }

    /// Wait until the hub has exactly `n` sessions.
    pub async fn wait_for_sessions(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        while self.state.sessions.count().await != n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {} session(s)",
                n
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    pub async fn send(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string()))
            .await
            .expect("Failed to send");
    }

    pub async fn send_json(&mut self, value: Value) {
        self.send(&value.to_string()).await;
    }

    /// Next text frame as JSON; panics if none arrives in time.
    pub async fn recv(&mut self) -> Value {
        self.try_recv(RECV_TIMEOUT)
            .await
            .expect("Timed out waiting for a message")
    }

    /// Next text frame as JSON, or `None` if nothing arrives within `wait`.
    pub async fn try_recv(&mut self, wait: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.ws.next()).await.ok()??;
            match frame.expect("WebSocket error") {
                Message::Text(text) => {
                    return Some(serde_json::from_str(&text).expect("Server sent invalid JSON"))
                },
                Message::Close(_) => return None,
                _ => continue,
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
