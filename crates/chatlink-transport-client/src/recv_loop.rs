//! Background receive loop of the messaging connection.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use chatlink_core::protocol::RECV_BUFFER_SIZE;
use chatlink_core::{ClientError, ConnectionEvent, ConnectionState, Framing, InboundMessage};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::EventSink;

/// Longest line buffered in [`Framing::Lines`] mode before it is emitted as is.
const MAX_LINE_BYTES: usize = 1_048_576;

// ── Framer ────────────────────────────────────────────────────────────────────

/// Turns reads into messages according to the configured [`Framing`].
pub(crate) enum Framer {
    Raw,
    Lines(BytesMut),
}

impl Framer {
    pub(crate) fn new(framing: Framing) -> Self {
        match framing {
            Framing::Raw => Framer::Raw,
            Framing::Lines => Framer::Lines(BytesMut::with_capacity(RECV_BUFFER_SIZE)),
        }
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<InboundMessage> {
        match self {
            Framer::Raw => vec![InboundMessage::from_bytes(chunk)],
            Framer::Lines(buf) => {
                buf.extend_from_slice(chunk);
                let mut out = Vec::new();
                while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line = buf.split_to(pos + 1);
                    let line = strip_line_ending(&line);
                    if !line.is_empty() {
                        out.push(InboundMessage::from_bytes(line));
                    }
                }
                if buf.len() > MAX_LINE_BYTES {
                    warn!("Inbound line exceeds {} bytes without a newline; emitting as is", MAX_LINE_BYTES);
                    out.push(InboundMessage::from_bytes(buf));
                    buf.clear();
                }
                out
            }
        }
    }

    /// Whatever is left over once the peer stops sending.
    pub(crate) fn finish(&mut self) -> Option<InboundMessage> {
        match self {
            Framer::Raw => None,
            Framer::Lines(buf) if buf.is_empty() => None,
            Framer::Lines(buf) => {
                let msg = InboundMessage::from_bytes(strip_line_ending(buf));
                buf.clear();
                Some(msg)
            }
        }
    }
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

// ── Receive loop ──────────────────────────────────────────────────────────────

enum Exit {
    Cancelled,
    PeerClosed,
    Failed(std::io::Error),
    Idle(Duration),
    ConsumerGone,
}

pub(crate) struct RecvLoop<R> {
    pub reader: R,
    pub events: EventSink<ConnectionEvent>,
    pub state: Arc<watch::Sender<ConnectionState>>,
    pub scope: CancellationToken,
    pub framing: Framing,
    pub idle_timeout: Option<Duration>,
    pub peer: String,
}

impl<R: AsyncRead + Unpin> RecvLoop<R> {
    /// Runs until cancelled, the peer closes, a read fails, or the event
    /// receiver is dropped. Leaves `Connected` on every exit but
    /// cancellation, which belongs to the disconnect path.
    pub(crate) async fn run(self) {
        let RecvLoop { mut reader, events, state, scope, framing, idle_timeout, peer } = self;
        let mut framer = Framer::new(framing);
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        debug!("Receive loop started ({})", peer);

        let exit = loop {
            let read = tokio::select! {
                biased;
                _ = scope.cancelled() => break Exit::Cancelled,
                r = read_some(&mut reader, &mut buf, idle_timeout) => r,
            };

            match read {
                Ok(Some(0)) => break Exit::PeerClosed,
                Ok(Some(n)) => {
                    let mut delivered = true;
                    for msg in framer.push(&buf[..n]) {
                        if !events.emit(ConnectionEvent::Message(msg)).await {
                            delivered = false;
                            break;
                        }
                    }
                    if !delivered {
                        break Exit::ConsumerGone;
                    }
                }
                Ok(None) => break Exit::Idle(idle_timeout.unwrap_or_default()),
                Err(e) => break Exit::Failed(e),
            }
        };

        if matches!(exit, Exit::Cancelled) {
            debug!("Receive loop cancelled ({})", peer);
            return;
        }

        if let Some(rest) = framer.finish() {
            events.emit(ConnectionEvent::Message(rest)).await;
        }

        state.send_if_modified(|s| {
            if *s == ConnectionState::Connected {
                *s = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        });

        match exit {
            Exit::PeerClosed => {
                info!("Server {} closed the connection", peer);
                events.emit(ConnectionEvent::Status("Server closed the connection".into())).await;
            }
            Exit::Failed(e) => {
                warn!("Receive from {} failed: {}", peer, e);
                events.emit(ConnectionEvent::Status("Connection interrupted".into())).await;
                events
                    .emit(ConnectionEvent::Error(ClientError::ReceiveFailure { reason: e.to_string() }))
                    .await;
            }
            Exit::Idle(limit) => {
                warn!("No data from {} for {:?}; giving up", peer, limit);
                events.emit(ConnectionEvent::Status("Connection interrupted".into())).await;
                events
                    .emit(ConnectionEvent::Error(ClientError::ReceiveFailure {
                        reason: format!("no data for {}ms", limit.as_millis()),
                    }))
                    .await;
            }
            Exit::ConsumerGone => debug!("Event receiver dropped; stopping receive loop ({})", peer),
            Exit::Cancelled => {}
        }
    }
}

/// One read, optionally bounded by the idle timeout. `Ok(None)` means the
/// timeout fired.
async fn read_some<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    idle_timeout: Option<Duration>,
) -> std::io::Result<Option<usize>> {
    match idle_timeout {
        None => reader.read(buf).await.map(Some),
        Some(limit) => match tokio::time::timeout(limit, reader.read(buf)).await {
            Ok(r) => r.map(Some),
            Err(_) => Ok(None),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncWriteExt};
    use tokio::sync::mpsc;

    fn texts(msgs: Vec<InboundMessage>) -> Vec<String> {
        msgs.into_iter().map(|m| m.text).collect()
    }

    #[test]
    fn raw_framing_is_one_message_per_read() {
        let mut framer = Framer::new(Framing::Raw);
        assert_eq!(texts(framer.push(b"[a]: hi[b]: yo")), vec!["[a]: hi[b]: yo"]);
        assert!(framer.finish().is_none());
    }

    #[test]
    fn line_framing_reassembles_across_reads() {
        let mut framer = Framer::new(Framing::Lines);
        assert!(framer.push(b"[a]: he").is_empty());
        assert_eq!(texts(framer.push(b"llo\r\n[b]: one\n\n[c]")), vec!["[a]: hello", "[b]: one"]);
        assert_eq!(framer.finish().map(|m| m.text), Some("[c]".to_string()));
        assert!(framer.finish().is_none());
    }

    fn spawn_loop<R: AsyncRead + Unpin + Send + 'static>(
        reader: R,
        idle_timeout: Option<Duration>,
    ) -> (
        mpsc::Receiver<ConnectionEvent>,
        watch::Receiver<ConnectionState>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    ) {
        let (events, rx) = EventSink::channel(16);
        let state = Arc::new(watch::Sender::new(ConnectionState::Connected));
        let state_rx = state.subscribe();
        let scope = CancellationToken::new();
        let task = tokio::spawn(
            RecvLoop {
                reader,
                events,
                state,
                scope: scope.clone(),
                framing: Framing::Raw,
                idle_timeout,
                peer: "test".into(),
            }
            .run(),
        );
        (rx, state_rx, scope, task)
    }

    #[tokio::test]
    async fn peer_close_ends_loop_and_leaves_connected() {
        let (client, mut server) = duplex(1024);
        let (mut rx, state, _scope, task) = spawn_loop(client, None);

        server.write_all("[bob]: chào".as_bytes()).await.unwrap();
        match rx.recv().await {
            Some(ConnectionEvent::Message(m)) => assert_eq!(m.text, "[bob]: chào"),
            other => panic!("expected message, got {other:?}"),
        }

        drop(server);
        task.await.unwrap();
        assert!(matches!(rx.recv().await, Some(ConnectionEvent::Status(_))));
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn cancellation_exits_silently() {
        let (client, _server) = duplex(1024);
        let (mut rx, state, scope, task) = spawn_loop(client, None);

        scope.cancel();
        task.await.unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(*state.borrow(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_reports_interruption() {
        let (client, _server) = duplex(1024);
        let (mut rx, state, _scope, task) = spawn_loop(client, Some(Duration::from_secs(30)));

        task.await.unwrap();
        assert!(matches!(rx.recv().await, Some(ConnectionEvent::Status(_))));
        assert!(matches!(
            rx.recv().await,
            Some(ConnectionEvent::Error(ClientError::ReceiveFailure { .. }))
        ));
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    }
}
