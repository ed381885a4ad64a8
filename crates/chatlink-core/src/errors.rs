use std::path::PathBuf;

use thiserror::Error;

/// Failures on the messaging connection.
///
/// None of these escape a public entry point; they are delivered as
/// [`ConnectionEvent::Error`](crate::ConnectionEvent::Error) alongside a
/// `false` return.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Timed out connecting to {addr} after {ms}ms")]
    ConnectTimeout { addr: String, ms: u64 },

    #[error("Connection to {addr} failed: {source}")]
    ConnectFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server did not answer the handshake within {ms}ms")]
    HandshakeTimeout { ms: u64 },

    #[error("Server rejected the handshake: {reason}")]
    HandshakeRejected { reason: String },

    #[error("Connect cancelled")]
    Cancelled,

    #[error("Send failed: {reason}")]
    SendFailure { reason: String },

    #[error("Receive failed: {reason}")]
    ReceiveFailure { reason: String },
}

/// Failures on the upload connection.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Not connected to the upload server")]
    NotConnected,

    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("File too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Server is not ready to receive the file: {reply:?}")]
    ServerNotReady { reply: String },

    #[error("Server did not reply within {ms}ms")]
    ReplyTimeout { ms: u64 },

    #[error("Upload I/O error: {reason}")]
    Io { reason: String },

    #[error("Server rejected the upload: {reply:?}")]
    ServerRejected { reply: String },

    #[error("Upload cancelled")]
    Cancelled,

    #[error(transparent)]
    Connect(#[from] ClientError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration invalid: {reason}")]
    Invalid { reason: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
