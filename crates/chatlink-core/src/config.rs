use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::protocol::{
    MAX_UPLOAD_BYTES, MSG_HANDSHAKE_TOKEN, UPLOAD_CHUNK_SIZE, UPLOAD_HANDSHAKE_TOKEN,
};

/// How the receive loop turns reads into messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// One read is one message. Matches the deployed server, which sends no
    /// delimiters; messages may split or coalesce across reads.
    #[default]
    Raw,
    /// Newline-delimited messages, buffered across reads.
    Lines,
}

/// Connect and handshake parameters for one of the two connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(alias = "connectTimeoutMs")]
    pub connect_timeout_ms: u64,
    #[serde(alias = "handshakeTimeoutMs")]
    pub handshake_timeout_ms: u64,
    #[serde(alias = "handshakeToken")]
    pub handshake_token: String,
}

impl EndpointConfig {
    /// Text messaging connection: 5 s connect, 3 s handshake.
    pub fn messaging() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            handshake_timeout_ms: 3_000,
            handshake_token: MSG_HANDSHAKE_TOKEN.to_owned(),
        }
    }

    /// File upload connection: 10 s connect for slow links, 3 s handshake.
    pub fn upload() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            handshake_timeout_ms: 3_000,
            handshake_token: UPLOAD_HANDSHAKE_TOKEN.to_owned(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.connect_timeout_ms == 0 || self.handshake_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: format!("{name}: timeouts must be non-zero"),
            });
        }
        if self.handshake_token.is_empty() {
            return Err(ConfigError::Invalid {
                reason: format!("{name}: handshake token must not be empty"),
            });
        }
        Ok(())
    }
}

// ── Partial endpoint sections ────────────────────────────────────────────────
//
// A config file may override single keys of an endpoint; the rest comes from
// that endpoint's preset, not from a shared default.

#[derive(Debug, Default, Deserialize)]
struct EndpointOverrides {
    #[serde(alias = "connectTimeoutMs")]
    connect_timeout_ms: Option<u64>,
    #[serde(alias = "handshakeTimeoutMs")]
    handshake_timeout_ms: Option<u64>,
    #[serde(alias = "handshakeToken")]
    handshake_token: Option<String>,
}

impl EndpointOverrides {
    fn apply(self, mut base: EndpointConfig) -> EndpointConfig {
        if let Some(ms) = self.connect_timeout_ms {
            base.connect_timeout_ms = ms;
        }
        if let Some(ms) = self.handshake_timeout_ms {
            base.handshake_timeout_ms = ms;
        }
        if let Some(token) = self.handshake_token {
            base.handshake_token = token;
        }
        base
    }
}

fn messaging_endpoint<'de, D>(de: D) -> Result<EndpointConfig, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(EndpointOverrides::deserialize(de)?.apply(EndpointConfig::messaging()))
}

fn upload_endpoint<'de, D>(de: D) -> Result<EndpointConfig, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(EndpointOverrides::deserialize(de)?.apply(EndpointConfig::upload()))
}

/// Client-wide configuration shared by the connection manager and uploader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(deserialize_with = "messaging_endpoint")]
    pub messaging: EndpointConfig,
    #[serde(deserialize_with = "upload_endpoint")]
    pub upload: EndpointConfig,
    /// Capacity of each event channel.
    #[serde(alias = "eventCapacity")]
    pub event_capacity: usize,
    pub framing: Framing,
    /// Treat a silent messaging peer as gone after this long. `None` blocks
    /// until data, cancellation or close.
    #[serde(alias = "idleTimeoutMs")]
    pub idle_timeout_ms: Option<u64>,
    /// Deadline for the READY / SUCCESS replies during an upload.
    #[serde(alias = "uploadReplyTimeoutMs")]
    pub upload_reply_timeout_ms: u64,
    #[serde(alias = "maxUploadBytes")]
    pub max_upload_bytes: u64,
    #[serde(alias = "chunkSize")]
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            messaging: EndpointConfig::messaging(),
            upload: EndpointConfig::upload(),
            event_capacity: 256,
            framing: Framing::Raw,
            idle_timeout_ms: None,
            upload_reply_timeout_ms: 60_000,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            chunk_size: UPLOAD_CHUNK_SIZE,
        }
    }
}

impl ClientConfig {
    /// Load and validate a JSON config file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let cfg: ClientConfig = serde_json::from_str(&raw)?;
        cfg.validate()?;
        tracing::debug!("Loaded config from {}", path.as_ref().display());
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.messaging.validate("messaging")?;
        self.upload.validate("upload")?;
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid {
                reason: "event_capacity must be at least 1".into(),
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                reason: "chunk_size must be non-zero".into(),
            });
        }
        if self.upload_reply_timeout_ms == 0 || self.idle_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid {
                reason: "reply and idle timeouts must be non-zero".into(),
            });
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    pub fn upload_reply_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_reply_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wire_protocol() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.messaging.connect_timeout_ms, 5_000);
        assert_eq!(cfg.upload.connect_timeout_ms, 10_000);
        assert_eq!(cfg.messaging.handshake_timeout_ms, 3_000);
        assert_eq!(cfg.upload.handshake_token, "FILE_UPLOAD_HANDSHAKE");
        assert_eq!(cfg.chunk_size, 65_536);
        assert_eq!(cfg.framing, Framing::Raw);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserializes_camel_case_fields() {
        let json = r#"{
            "messaging": {"connectTimeoutMs": 1500, "handshakeToken": "HELLO"},
            "eventCapacity": 32,
            "framing": "lines",
            "idleTimeoutMs": 90000
        }"#;

        let cfg: ClientConfig = serde_json::from_str(json).expect("valid camelCase config");
        assert_eq!(cfg.messaging.connect_timeout_ms, 1_500);
        assert_eq!(cfg.messaging.handshake_timeout_ms, 3_000);
        assert_eq!(cfg.messaging.handshake_token, "HELLO");
        assert_eq!(cfg.event_capacity, 32);
        assert_eq!(cfg.framing, Framing::Lines);
        assert_eq!(cfg.idle_timeout(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn partial_sections_keep_their_own_preset() {
        let cfg: ClientConfig = serde_json::from_str("{}").expect("empty config");
        assert_eq!(cfg.upload, EndpointConfig::upload());

        let json = r#"{"upload": {"connect_timeout_ms": 20000}}"#;
        let cfg: ClientConfig = serde_json::from_str(json).expect("partial upload section");
        assert_eq!(cfg.upload.connect_timeout_ms, 20_000);
        assert_eq!(cfg.upload.handshake_token, "FILE_UPLOAD_HANDSHAKE");
        assert_eq!(cfg.messaging, EndpointConfig::messaging());
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let cfg = ClientConfig { chunk_size: 0, ..ClientConfig::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatlink.json");
        std::fs::write(&path, r#"{"upload_reply_timeout_ms": 5000}"#).unwrap();

        let cfg = ClientConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.upload_reply_timeout(), Duration::from_secs(5));

        std::fs::write(&path, r#"{"messaging": {"handshake_token": ""}}"#).unwrap();
        assert!(ClientConfig::from_json_file(&path).is_err());
    }
}
