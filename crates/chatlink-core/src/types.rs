use std::fmt;

use crate::errors::{ClientError, UploadError};

// MARK: - ConnectionState

/// Lifecycle of one logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting   => "connecting",
            ConnectionState::Connected    => "connected",
            ConnectionState::Closing      => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// MARK: - InboundMessage

/// Text received on the messaging connection.
///
/// With raw framing this is exactly one read's worth of bytes, decoded as
/// UTF-8 with invalid sequences replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub text: String,
}

impl InboundMessage {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self { text: String::from_utf8_lossy(bytes).into_owned() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

// MARK: - Events

/// Notifications from the messaging connection.
#[derive(Debug)]
pub enum ConnectionEvent {
    Status(String),
    Error(ClientError),
    Message(InboundMessage),
}

/// Notifications from the upload connection.
#[derive(Debug)]
pub enum UploadEvent {
    /// Integer percentage in `1..=100`, strictly increasing within one upload.
    Progress(u8),
    Status(String),
    Completed(String),
    Error(UploadError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_decodes_lossy() {
        let msg = InboundMessage::from_bytes(b"hi \xff there");
        assert_eq!(msg.as_str(), "hi \u{fffd} there");
        assert_eq!(InboundMessage::from_bytes("xin chào".as_bytes()).text, "xin chào");
    }

    #[test]
    fn state_defaults_to_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
    }
}
