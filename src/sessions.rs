//! Live WebSocket sessions and message fan-out.
//!
//! Each session is represented by the sending half of its outbound queue. A
//! per-connection task drains the queue into the socket, so delivering here
//! never waits on the network.

use crate::protocol::OutboundMessage;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

pub type SessionId = u64;

/// Where a message produced by the engine should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Only the given session
    Session(SessionId),
    /// Every session connected at delivery time
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub destination: Destination,
    pub message: OutboundMessage,
}

impl Dispatch {
    pub fn reply(session: SessionId, message: OutboundMessage) -> Self {
        Self {
            destination: Destination::Session(session),
            message,
        }
    }

    pub fn broadcast(message: OutboundMessage) -> Self {
        Self {
            destination: Destination::All,
            message,
        }
    }
}

#[derive(Debug)]
struct SessionEntry {
    tx: mpsc::UnboundedSender<String>,
    peer: Option<SocketAddr>,
    connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
}

/// The set of connected sessions, shared by every connection task.
#[derive(Clone, Default)]
pub struct SessionHub {
    sessions: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
    next_id: Arc<AtomicU64>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session whose outbound frames are pushed into `tx`.
    pub async fn open(
        &self,
        tx: mpsc::UnboundedSender<String>,
        peer: Option<SocketAddr>,
    ) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = SessionEntry {
            tx,
            peer,
            connected_at: Utc::now(),
        };
        self.sessions.write().await.insert(id, entry);
        id
    }

    /// Forget a session. Returns `false` if it was already gone.
    pub async fn close(&self, id: SessionId) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<SessionInfo> = sessions
            .iter()
            .map(|(id, s)| SessionInfo {
                id: *id,
                peer: s.peer,
                connected_at: s.connected_at,
            })
            .collect();
        list.sort_by_key(|s| s.id);
        list
    }

    /// Send to every session connected right now. Sessions whose queue is
    /// closed are skipped. Returns how many sessions accepted the message.
    pub async fn broadcast(&self, message: &OutboundMessage) -> usize {
        let json = message.to_json();
        let sessions = self.sessions.read().await;
        tracing::info!(
            "Broadcasting to all {} client(s): {}",
            sessions.len(),
            json
        );

        let mut delivered = 0;
        for (id, session) in sessions.iter() {
            if session.tx.send(json.clone()).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(session_id = id, "Skipping closed session during broadcast");
            }
        }
        delivered
    }

    /// Send to one session. Returns `false` if it is gone or closing.
    pub async fn reply(&self, id: SessionId, message: &OutboundMessage) -> bool {
        let json = message.to_json();
        let sessions = self.sessions.read().await;
        let Some(session) = sessions.get(&id) else {
            tracing::debug!(session_id = id, "Reply to unknown session dropped");
            return false;
        };
        tracing::debug!(session_id = id, "Sending to client: {}", json);
        session.tx.send(json).is_ok()
    }

    pub async fn deliver(&self, dispatches: Vec<Dispatch>) {
        for dispatch in dispatches {
            match dispatch.destination {
                Destination::All => {
                    self.broadcast(&dispatch.message).await;
                },
                Destination::Session(id) => {
                    self.reply(id, &dispatch.message).await;
                },
            }
        }
    }
}
