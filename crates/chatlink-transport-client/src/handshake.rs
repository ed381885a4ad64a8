//! Request/reply exchange and the connect-time handshake built on it.
//!
//! The server answers with free text and there is no framing, so a reply is
//! whatever a single read returns (up to 1 KiB). Acceptance is a substring
//! test; a reply split across two reads is a known weakness of the protocol.

use std::time::Duration;

use chatlink_core::protocol::{handshake_ok, REPLY_BUFFER_SIZE};
use chatlink_core::{ClientError, EndpointConfig};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug)]
pub(crate) enum ExchangeError {
    TimedOut,
    Cancelled,
    /// Peer closed before replying.
    Closed,
    Io(std::io::Error),
}

/// Write `request`, then read one reply, all within `deadline`.
pub(crate) async fn request_reply<S>(
    stream: &mut S,
    request: &[u8],
    deadline: Duration,
    scope: &CancellationToken,
) -> Result<String, ExchangeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let exchange_scope = scope.child_token();
    let exchange = async {
        stream.write_all(request).await?;
        stream.flush().await?;
        let mut buf = [0u8; REPLY_BUFFER_SIZE];
        let n = stream.read(&mut buf).await?;
        Ok::<_, std::io::Error>(buf[..n].to_vec())
    };

    let outcome = tokio::select! {
        biased;
        _ = exchange_scope.cancelled() => return Err(ExchangeError::Cancelled),
        r = tokio::time::timeout(deadline, exchange) => r,
    };

    match outcome {
        Err(_) => Err(ExchangeError::TimedOut),
        Ok(Err(e)) => Err(ExchangeError::Io(e)),
        Ok(Ok(bytes)) if bytes.is_empty() => Err(ExchangeError::Closed),
        Ok(Ok(bytes)) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

/// Whether `reply` acknowledges `token` (the token itself or its `_OK` form).
pub fn accepts_handshake(reply: &str, token: &str) -> bool {
    reply.contains(&handshake_ok(token)) || reply.contains(token)
}

/// Send the endpoint's handshake token and check the server's answer.
pub(crate) async fn perform<S>(
    stream: &mut S,
    endpoint: &EndpointConfig,
    scope: &CancellationToken,
) -> Result<(), ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let token = endpoint.handshake_token.as_str();
    let deadline = endpoint.handshake_timeout();

    match request_reply(stream, token.as_bytes(), deadline, scope).await {
        Ok(reply) if accepts_handshake(&reply, token) => {
            debug!("Handshake accepted ({:?})", reply);
            Ok(())
        }
        Ok(reply) => {
            warn!("Handshake rejected: unexpected reply {:?}", reply);
            Err(ClientError::HandshakeRejected { reason: format!("unexpected reply {:?}", reply) })
        }
        Err(ExchangeError::TimedOut) => {
            warn!("Handshake timed out after {:?}", deadline);
            Err(ClientError::HandshakeTimeout { ms: deadline.as_millis() as u64 })
        }
        Err(ExchangeError::Cancelled) => Err(ClientError::Cancelled),
        Err(ExchangeError::Closed) => Err(ClientError::HandshakeRejected {
            reason: "connection closed by server".into(),
        }),
        Err(ExchangeError::Io(e)) => {
            Err(ClientError::HandshakeRejected { reason: e.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn endpoint(timeout_ms: u64) -> EndpointConfig {
        EndpointConfig { handshake_timeout_ms: timeout_ms, ..EndpointConfig::messaging() }
    }

    #[test]
    fn acceptance_is_substring_match() {
        assert!(accepts_handshake("HANDSHAKE_REQUEST", "HANDSHAKE_REQUEST"));
        assert!(accepts_handshake("ack: HANDSHAKE_REQUEST_OK\n", "HANDSHAKE_REQUEST"));
        assert!(!accepts_handshake("HELLO", "HANDSHAKE_REQUEST"));
        assert!(!accepts_handshake("HANDSHAKE_REQ", "HANDSHAKE_REQUEST"));
    }

    #[tokio::test]
    async fn echoed_token_is_accepted() {
        let (mut client, mut server) = duplex(1024);
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let n = server.read(&mut buf).await.unwrap();
            server.write_all(&buf[..n]).await.unwrap();
        });

        let scope = CancellationToken::new();
        perform(&mut client, &endpoint(1_000), &scope).await.unwrap();
    }

    #[tokio::test]
    async fn wrong_reply_is_rejected() {
        let (mut client, mut server) = duplex(1024);
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = server.read(&mut buf).await.unwrap();
            server.write_all(b"GO AWAY").await.unwrap();
        });

        let scope = CancellationToken::new();
        let err = perform(&mut client, &endpoint(1_000), &scope).await.unwrap_err();
        assert!(matches!(err, ClientError::HandshakeRejected { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn closed_peer_is_rejected() {
        let (mut client, server) = duplex(1024);
        drop(server);

        let scope = CancellationToken::new();
        let err = perform(&mut client, &endpoint(1_000), &scope).await.unwrap_err();
        assert!(matches!(err, ClientError::HandshakeRejected { .. }), "got {err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out() {
        let (mut client, _server) = duplex(1024);

        let scope = CancellationToken::new();
        let err = perform(&mut client, &endpoint(3_000), &scope).await.unwrap_err();
        assert!(matches!(err, ClientError::HandshakeTimeout { ms: 3_000 }), "got {err:?}");
    }

    #[tokio::test]
    async fn cancelled_scope_wins() {
        let (mut client, _server) = duplex(1024);

        let scope = CancellationToken::new();
        scope.cancel();
        let err = perform(&mut client, &endpoint(3_000), &scope).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
    }
}
