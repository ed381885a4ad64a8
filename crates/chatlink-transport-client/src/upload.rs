//! Chunked file upload over a dedicated connection.
//!
//! # Wire sequence
//!
//! ```text
//! client                                   server
//! ──────                                   ──────
//! FILE_UPLOAD_HANDSHAKE              ──►
//!                                    ◄──   …FILE_UPLOAD_HANDSHAKE[_OK]…
//! FILE_UPLOAD_START|user|name|size   ──►
//!                                    ◄──   …FILE_UPLOAD_READY…
//! <size bytes, 64 KiB writes>        ──►
//! FILE_UPLOAD_END                    ──►
//!                                    ◄──   …FILE_UPLOAD_SUCCESS…
//! ```
//!
//! Control lines carry no delimiter. A failure after START leaves the server
//! mid-transfer, so the connection is dropped and the caller reconnects.

use std::path::Path;

use chatlink_core::format::{format_file_size, format_upload_estimate};
use chatlink_core::protocol::{upload_start_line, UPLOAD_END, UPLOAD_READY, UPLOAD_SUCCESS};
use chatlink_core::{ClientConfig, ConnectionState, UploadError, UploadEvent};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::EventSink;
use crate::handshake::{request_reply, ExchangeError};
use crate::net;
use crate::session::UploadSession;

// ── FileUploader ──────────────────────────────────────────────────────────────

/// Owns the upload connection. One transfer at a time (`&mut self`).
///
/// Upload events are awaited into a bounded channel: the caller must keep
/// draining the receiver while `upload_file` runs, or the transfer stalls
/// once `event_capacity` events are queued.
pub struct FileUploader {
    config: ClientConfig,
    events: EventSink<UploadEvent>,
    state: watch::Sender<ConnectionState>,
    scope: CancellationToken,
    stream: Option<TcpStream>,
    peer: String,
}

impl FileUploader {
    pub fn new(config: ClientConfig) -> (Self, mpsc::Receiver<UploadEvent>) {
        let (events, rx) = EventSink::channel(config.event_capacity);
        let uploader = Self {
            config,
            events,
            state: watch::Sender::new(ConnectionState::Disconnected),
            scope: CancellationToken::new(),
            stream: None,
            peer: String::new(),
        };
        (uploader, rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected && self.stream.is_some()
    }

    /// Cancelling this token aborts an in-flight connect or upload.
    ///
    /// `disconnect` cancels this scope and installs a fresh one, so re-fetch
    /// the token after every connect.
    pub fn cancel_token(&self) -> CancellationToken {
        self.scope.clone()
    }

    // ── Connect / disconnect ─────────────────────────────────────────────────

    pub async fn connect(&mut self, host: &str, port: u16) -> bool {
        if self.state() == ConnectionState::Connected {
            self.disconnect().await;
        }
        self.stream = None;
        if self.scope.is_cancelled() {
            self.scope = CancellationToken::new();
        }

        self.state.send_replace(ConnectionState::Connecting);
        match net::open_channel(host, port, &self.config.upload, &self.scope).await {
            Ok(tcp) => {
                self.stream = Some(tcp);
                self.peer = format!("{}:{}", host, port);
                self.state.send_replace(ConnectionState::Connected);
                info!("Upload channel connected to {}", self.peer);
                self.events
                    .emit(UploadEvent::Status(format!("Connected to server {}", self.peer)))
                    .await;
                true
            }
            Err(e) => {
                warn!("Upload connect to {}:{} failed: {}", host, port, e);
                self.state.send_replace(ConnectionState::Disconnected);
                self.events.emit(UploadEvent::Error(e.into())).await;
                false
            }
        }
    }

    /// Idempotent; aborts nothing by itself since an upload holds `&mut self`,
    /// use [`cancel_token`](Self::cancel_token) for that.
    pub async fn disconnect(&mut self) {
        self.state.send_replace(ConnectionState::Closing);
        self.scope.cancel();
        self.release().await;
        self.scope = CancellationToken::new();
        self.state.send_replace(ConnectionState::Disconnected);
        self.events.try_emit(UploadEvent::Status("Disconnected from server".into()));
    }

    async fn release(&mut self) {
        if let Some(mut tcp) = self.stream.take() {
            debug!("Closing upload channel to {}", self.peer);
            if let Err(e) = tcp.shutdown().await {
                debug!("Shutdown of {} ignored: {}", self.peer, e);
            }
        }
    }

    // ── Upload ───────────────────────────────────────────────────────────────

    /// Send the file at `path` on behalf of `username`.
    ///
    /// Precondition failures (not connected, missing file, over the size
    /// limit) report an error before any byte is written.
    pub async fn upload_file(&mut self, path: impl AsRef<Path>, username: &str) -> bool {
        match self.try_upload(path.as_ref(), username).await {
            Ok(file_name) => {
                info!("Upload of {} to {} completed", file_name, self.peer);
                self.events.emit(UploadEvent::Completed(format!("Uploaded {}", file_name))).await;
                self.events
                    .emit(UploadEvent::Status(format!("Upload finished: {}", file_name)))
                    .await;
                true
            }
            Err(e) => {
                warn!("Upload of {} failed: {}", path.as_ref().display(), e);
                self.events.emit(UploadEvent::Error(e)).await;
                false
            }
        }
    }

    async fn try_upload(&mut self, path: &Path, username: &str) -> Result<String, UploadError> {
        if !self.is_connected() {
            return Err(UploadError::NotConnected);
        }
        let (mut session, file) = UploadSession::open(path, self.config.max_upload_bytes).await?;

        info!("Uploading {} ({} bytes) to {}", session.file_name, session.file_size, self.peer);
        self.events
            .emit(UploadEvent::Status(format!(
                "Starting upload: {} ({})",
                session.file_name,
                format_file_size(session.file_size)
            )))
            .await;
        self.events
            .emit(UploadEvent::Status(format!(
                "Estimated time: {}",
                format_upload_estimate(session.file_size)
            )))
            .await;

        let Some(stream) = self.stream.as_mut() else {
            return Err(UploadError::NotConnected);
        };
        let transfer = Transfer {
            stream,
            events: &self.events,
            scope: &self.scope,
            config: &self.config,
        };
        let result = transfer.run(&mut session, file, username).await;

        if let Err(e) = &result {
            if leaves_stream_desynchronized(e) {
                warn!("Dropping upload channel to {} after failed transfer", self.peer);
                self.release().await;
                self.state.send_replace(ConnectionState::Disconnected);
                self.events
                    .emit(UploadEvent::Status("Upload connection closed".into()))
                    .await;
            }
        }
        result.map(|()| session.file_name)
    }
}

impl Drop for FileUploader {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

/// Failures after which the server may still be expecting file bytes.
fn leaves_stream_desynchronized(err: &UploadError) -> bool {
    matches!(
        err,
        UploadError::Io { .. } | UploadError::Cancelled | UploadError::ReplyTimeout { .. }
    )
}

// ── Transfer ──────────────────────────────────────────────────────────────────

struct Transfer<'a> {
    stream: &'a mut TcpStream,
    events: &'a EventSink<UploadEvent>,
    scope: &'a CancellationToken,
    config: &'a ClientConfig,
}

impl Transfer<'_> {
    async fn run(
        mut self,
        session: &mut UploadSession,
        file: File,
        username: &str,
    ) -> Result<(), UploadError> {
        let start = upload_start_line(username, &session.file_name, session.file_size);
        let reply = self.exchange(start.as_bytes()).await?;
        if !reply.contains(UPLOAD_READY) {
            return Err(UploadError::ServerNotReady { reply });
        }

        self.stream_file(session, file).await?;

        let reply = self.exchange(UPLOAD_END.as_bytes()).await?;
        if !reply.contains(UPLOAD_SUCCESS) {
            return Err(UploadError::ServerRejected { reply });
        }
        Ok(())
    }

    async fn exchange(&mut self, request: &[u8]) -> Result<String, UploadError> {
        let deadline = self.config.upload_reply_timeout();
        request_reply(&mut *self.stream, request, deadline, self.scope)
            .await
            .map_err(|e| match e {
                ExchangeError::TimedOut => {
                    UploadError::ReplyTimeout { ms: deadline.as_millis() as u64 }
                }
                ExchangeError::Cancelled => UploadError::Cancelled,
                ExchangeError::Closed => {
                    UploadError::Io { reason: "connection closed by server".into() }
                }
                ExchangeError::Io(e) => UploadError::Io { reason: e.to_string() },
            })
    }

    async fn stream_file(&mut self, session: &mut UploadSession, file: File) -> Result<(), UploadError> {
        // Never read past the size announced in START, even if the file grows.
        let mut reader = file.take(session.file_size);
        let mut buf = vec![0u8; self.config.chunk_size];

        loop {
            let n = tokio::select! {
                biased;
                _ = self.scope.cancelled() => return Err(UploadError::Cancelled),
                r = fill_chunk(&mut reader, &mut buf) => r.map_err(|e| UploadError::Io {
                    reason: format!("reading file: {}", e),
                })?,
            };
            if n == 0 {
                break;
            }

            tokio::select! {
                biased;
                _ = self.scope.cancelled() => return Err(UploadError::Cancelled),
                r = self.stream.write_all(&buf[..n]) => r.map_err(|e| UploadError::Io {
                    reason: format!("writing to server: {}", e),
                })?,
            }

            if let Some(pct) = session.record_sent(n as u64) {
                self.report(session, pct).await;
            }
        }

        if !session.is_complete() {
            return Err(UploadError::Io {
                reason: format!(
                    "file shrank during upload: sent {} of {} bytes",
                    session.bytes_sent(),
                    session.file_size
                ),
            });
        }
        if let Some(pct) = session.finish() {
            self.report(session, pct).await;
        }
        debug!("Streamed {} bytes of {}", session.bytes_sent(), session.file_name);
        Ok(())
    }

    async fn report(&self, session: &UploadSession, pct: u8) {
        self.events.emit(UploadEvent::Progress(pct)).await;
        self.events
            .emit(UploadEvent::Status(format!(
                "Uploading... {}% ({}/{})",
                pct,
                format_file_size(session.bytes_sent()),
                format_file_size(session.file_size)
            )))
            .await;
    }
}

/// Read until `buf` is full or the reader is exhausted, so every write but
/// the last is a whole chunk.
async fn fill_chunk<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn fill_chunk_reads_whole_chunks() {
        let data = vec![7u8; 150];
        let mut reader = &data[..];
        let mut buf = [0u8; 64];
        assert_eq!(fill_chunk(&mut reader, &mut buf).await.unwrap(), 64);
        assert_eq!(fill_chunk(&mut reader, &mut buf).await.unwrap(), 64);
        assert_eq!(fill_chunk(&mut reader, &mut buf).await.unwrap(), 22);
        assert_eq!(fill_chunk(&mut reader, &mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upload_without_connection_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"abc").unwrap();

        let (mut uploader, mut events) = FileUploader::new(ClientConfig::default());
        assert!(!uploader.upload_file(&path, "alice").await);
        assert!(matches!(events.recv().await, Some(UploadEvent::Error(UploadError::NotConnected))));
    }

    #[tokio::test]
    async fn cancelled_scope_aborts_upload_and_drops_channel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let n = sock.read(&mut buf).await.unwrap();
            sock.write_all(&buf[..n]).await.unwrap();
            let _ = sock.read(&mut buf).await;
            let _ = sock.write_all(b"FILE_UPLOAD_READY").await;
            while matches!(sock.read(&mut buf).await, Ok(n) if n > 0) {}
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, vec![1u8; 200_000]).unwrap();

        let (mut uploader, _events) = FileUploader::new(ClientConfig::default());
        assert!(uploader.connect("127.0.0.1", port).await);
        uploader.cancel_token().cancel();
        assert!(!uploader.upload_file(&path, "alice").await);
        assert!(!uploader.is_connected());

        uploader.disconnect().await;
        uploader.disconnect().await;
        assert_eq!(uploader.state(), ConnectionState::Disconnected);
    }
}
