//! Socket helpers: outbound connects and TCP tuning.

use crate::util::dns_cache::resolve_host;
use crate::util::{ProxyError, Result};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Bound on DNS resolution plus TCP handshake for any outbound connect.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Open a TCP connection to `host:port`.
///
/// Resolves the host through the DNS cache, bounds the whole attempt
/// by [`CONNECT_TIMEOUT`] and applies the usual TCP tuning before
/// handing the stream back.
pub async fn connect_to(host: &str, port: u16) -> Result<TcpStream> {
    let addr = resolve_host(host, port).await?;

    let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            ProxyError::Connect(format!(
                "connection timeout ({}s) to {}:{}",
                CONNECT_TIMEOUT.as_secs(),
                host,
                port
            ))
        })?
        .map_err(|e| ProxyError::Connect(format!("failed to connect to {}:{}: {}", host, port, e)))?;

    configure_tcp_stream(&stream, host);
    Ok(stream)
}

/// Enable low-latency options on a TCP stream (best-effort).
pub fn configure_tcp_stream(stream: &TcpStream, context: &str) {
    if let Err(err) = stream.set_nodelay(true) {
        debug!("[Net] Failed to enable TCP_NODELAY for {}: {}", context, err);
    }

    #[cfg(any(unix, windows))]
    {
        use socket2::{SockRef, TcpKeepalive};

        let keepalive = TcpKeepalive::new()
            .with_time(Duration::from_secs(120))
            .with_interval(Duration::from_secs(30));

        if let Err(err) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
            debug!(
                "[Net] Failed to configure TCP keepalive for {}: {}",
                context, err
            );
        }
    }
}
