//! Timeout-bounded TCP connect shared by both connections.

use std::time::Duration;

use chatlink_core::{ClientError, EndpointConfig};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::handshake;

/// Open a TCP connection within `limit`.
///
/// On timeout the in-flight attempt is dropped, which closes the partially
/// opened socket.
pub(crate) async fn connect_bounded(
    host: &str,
    port: u16,
    limit: Duration,
    scope: &CancellationToken,
) -> Result<TcpStream, ClientError> {
    let addr = format!("{}:{}", host, port);
    let connect_scope = scope.child_token();
    debug!("Connecting to {} (timeout {:?})", addr, limit);

    let attempt = tokio::select! {
        biased;
        _ = connect_scope.cancelled() => return Err(ClientError::Cancelled),
        r = tokio::time::timeout(limit, TcpStream::connect((host, port))) => r,
    };

    let tcp = match attempt {
        Err(_) => {
            return Err(ClientError::ConnectTimeout { addr, ms: limit.as_millis() as u64 })
        }
        Ok(Err(source)) => return Err(ClientError::ConnectFailure { addr, source }),
        Ok(Ok(tcp)) => tcp,
    };
    tcp.set_nodelay(true)
        .map_err(|source| ClientError::ConnectFailure { addr: addr.clone(), source })?;
    Ok(tcp)
}

/// Connect and run the endpoint's handshake. The stream is dropped (closed)
/// on any failure.
pub(crate) async fn open_channel(
    host: &str,
    port: u16,
    endpoint: &EndpointConfig,
    scope: &CancellationToken,
) -> Result<TcpStream, ClientError> {
    let mut tcp = connect_bounded(host, port, endpoint.connect_timeout(), scope).await?;
    handshake::perform(&mut tcp, endpoint, scope).await?;
    info!("Channel open to {}:{} (token={})", host, port, endpoint.handshake_token);
    Ok(tcp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn refused_port_is_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let scope = CancellationToken::new();
        let err = connect_bounded("127.0.0.1", port, Duration::from_secs(5), &scope)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::ConnectFailure { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn cancelled_scope_aborts_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let scope = CancellationToken::new();
        scope.cancel();
        let err = connect_bounded("127.0.0.1", port, Duration::from_secs(5), &scope)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
    }
}
