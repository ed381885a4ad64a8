//! Text messaging connection (connect → handshake → receive loop + send).
//!
//! # Lifecycle
//!
//! ```text
//! 1. let (mut conn, events) = ConnectionManager::new(config)
//! 2. conn.connect(host, port)          ← Disconnected → Connecting → Connected
//!       └─ spawns the receive loop; inbound text arrives on `events`
//! 3. conn.send_message("[alice]: hi")  ← single writer, `&mut self`
//! 4. conn.disconnect()                 ← Closing → Disconnected, idempotent
//! ```

use std::sync::Arc;
use std::time::Duration;

use chatlink_core::{ClientConfig, ClientError, ConnectionEvent, ConnectionState};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::EventSink;
use crate::net;
use crate::recv_loop::RecvLoop;

/// How long `disconnect` waits for the receive task before aborting it.
const RECV_TASK_GRACE: Duration = Duration::from_secs(1);

// ── Link ──────────────────────────────────────────────────────────────────────

/// The live half of a connection: write side plus the task owning the read side.
struct Link {
    writer: OwnedWriteHalf,
    recv_task: JoinHandle<()>,
    peer: String,
}

impl Link {
    /// Shut down the socket and wait (bounded) for the receive task. Errors
    /// on an already-closed socket are expected and only logged.
    async fn close(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!("Shutdown of {} ignored: {}", self.peer, e);
        }
        drop(self.writer);

        match tokio::time::timeout(RECV_TASK_GRACE, &mut self.recv_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Receive task for {} ended abnormally: {}", self.peer, e),
            Err(_) => {
                warn!("Receive task for {} did not stop in {:?}; aborting", self.peer, RECV_TASK_GRACE);
                self.recv_task.abort();
            }
        }
    }
}

// ── ConnectionManager ─────────────────────────────────────────────────────────

/// Owns the messaging connection to the chat server.
///
/// Every public operation reports failures as [`ConnectionEvent::Error`] and
/// a `false` return; nothing here panics or returns an error to the caller.
pub struct ConnectionManager {
    config: ClientConfig,
    events: EventSink<ConnectionEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
    scope: CancellationToken,
    link: Option<Link>,
}

impl ConnectionManager {
    /// Create a manager and the receiving end of its event channel.
    pub fn new(config: ClientConfig) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (events, rx) = EventSink::channel(config.event_capacity);
        let manager = Self {
            config,
            events,
            state: Arc::new(watch::Sender::new(ConnectionState::Disconnected)),
            scope: CancellationToken::new(),
            link: None,
        };
        (manager, rx)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions, including the receive loop noticing a closed
    /// connection.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected && self.link.is_some()
    }

    /// The current connection's cancellation scope. Cancelling it aborts an
    /// in-flight connect or handshake and stops the receive loop; the
    /// connection still needs [`disconnect`](Self::disconnect) afterwards.
    ///
    /// `disconnect` cancels this scope and installs a fresh one, so re-fetch
    /// the token after every connect; an older token controls nothing.
    pub fn cancel_token(&self) -> CancellationToken {
        self.scope.clone()
    }

    // ── Connect ──────────────────────────────────────────────────────────────

    /// Connect to `host:port`, handshake, and start receiving.
    ///
    /// An existing connection is torn down first. Returns `true` once the
    /// connection is established.
    pub async fn connect(&mut self, host: &str, port: u16) -> bool {
        if self.state() == ConnectionState::Connected {
            self.disconnect().await;
        } else if let Some(stale) = self.link.take() {
            stale.close().await;
        }
        if self.scope.is_cancelled() {
            self.scope = CancellationToken::new();
        }

        match self.try_connect(host, port).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Connect to {}:{} failed: {}", host, port, e);
                self.state.send_replace(ConnectionState::Disconnected);
                self.events.emit(ConnectionEvent::Error(e)).await;
                false
            }
        }
    }

    async fn try_connect(&mut self, host: &str, port: u16) -> Result<(), ClientError> {
        self.state.send_replace(ConnectionState::Connecting);
        let tcp = net::open_channel(host, port, &self.config.messaging, &self.scope).await?;

        let peer = format!("{}:{}", host, port);
        let (reader, writer) = tcp.into_split();

        self.state.send_replace(ConnectionState::Connected);
        info!("Connected to chat server {}", peer);
        self.events.emit(ConnectionEvent::Status(format!("Connected to server {}", peer))).await;

        let recv_task = tokio::spawn(
            RecvLoop {
                reader,
                events: self.events.clone(),
                state: Arc::clone(&self.state),
                scope: self.scope.clone(),
                framing: self.config.framing,
                idle_timeout: self.config.idle_timeout(),
                peer: peer.clone(),
            }
            .run(),
        );

        self.link = Some(Link { writer, recv_task, peer });
        Ok(())
    }

    // ── Disconnect ───────────────────────────────────────────────────────────

    /// Tear the connection down. Safe in any state and on repeated calls.
    pub async fn disconnect(&mut self) {
        self.state.send_replace(ConnectionState::Closing);
        self.scope.cancel();

        if let Some(link) = self.link.take() {
            info!("Disconnecting from {}", link.peer);
            link.close().await;
        }

        self.scope = CancellationToken::new();
        self.state.send_replace(ConnectionState::Disconnected);
        self.events.try_emit(ConnectionEvent::Status("Disconnected from server".into()));
    }

    // ── Send ─────────────────────────────────────────────────────────────────

    /// Write `text` as raw UTF-8, no delimiter.
    ///
    /// Returns `false` without touching any socket when not connected.
    pub async fn send_message(&mut self, text: &str) -> bool {
        let connected = self.state() == ConnectionState::Connected;
        let link = match self.link.as_mut() {
            Some(link) if connected => link,
            _ => {
                self.events
                    .emit(ConnectionEvent::Error(ClientError::SendFailure {
                        reason: "not connected to server".into(),
                    }))
                    .await;
                return false;
            }
        };

        match link.writer.write_all(text.as_bytes()).await {
            Ok(()) => {
                debug!("Sent {} bytes to {}", text.len(), link.peer);
                true
            }
            Err(e) => {
                warn!("Send to {} failed: {}", link.peer, e);
                self.events
                    .emit(ConnectionEvent::Error(ClientError::SendFailure { reason: e.to_string() }))
                    .await;
                false
            }
        }
    }
}

impl Drop for ConnectionManager {
    /// Stops the receive task; the socket halves close as they drop.
    fn drop(&mut self) {
        self.scope.cancel();
    }
}
