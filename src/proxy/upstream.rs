//! Opening the server side of a connection.
//!
//! Three mutually exclusive modes: a fixed TCP tunnel, a parent proxy,
//! or a direct connection to the origin. The connector writes the
//! outbound request line plus the `Host` and `Connection: close`
//! headers; the header rewriter takes over from there.

use crate::config::{Config, HostPort};
use crate::http::request::Request;
use crate::proxy::conn::Connection;
use crate::util::net::connect_to;
use crate::util::Result;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Establish the fixed tunnel. On success the pipeline goes straight
/// to the relay; the channel is opaque from the first client byte.
pub async fn establish_tunnel(conn: &mut Connection, tunnel: &HostPort) -> Result<()> {
    log_peeked_request(&conn.client).await;

    match connect_to(&tunnel.host, tunnel.port).await {
        Ok(server) => {
            info!("[Tunnel] redirecting connection to {}", tunnel);
            conn.server = Some(server);
            Ok(())
        }
        Err(e) => {
            conn.send_error(404, "Not Found", "Unable to reach the tunnel destination.")
                .await
                .ok();
            Err(e)
        }
    }
}

/// Log up to one line of the pending client request without consuming
/// any bytes. Best effort: if the client has not spoken within a short
/// grace period the tunnel proceeds unlogged, which keeps
/// server-speaks-first protocols working.
async fn log_peeked_request(client: &TcpStream) {
    let mut peek = [0u8; 512];
    let peeked =
        tokio::time::timeout(std::time::Duration::from_millis(100), client.peek(&mut peek)).await;

    if let Ok(Ok(n)) = peeked {
        if n > 0 {
            let text = String::from_utf8_lossy(&peek[..n]);
            let first_line = text.lines().next().unwrap_or_default();
            info!("[Tunnel] client request begins: {:?}", first_line);
        }
    }
}

/// Connect the server socket and write the outbound preamble.
///
/// Chooses upstream-proxy or direct mode from the configuration; the
/// tunnel mode never reaches this point.
pub async fn connect_upstream(conn: &mut Connection, request: &Request, config: &Config) -> Result<()> {
    if let Some(upstream) = &config.upstream {
        connect_via_upstream(conn, request, upstream).await
    } else {
        connect_direct(conn, request).await
    }
}

async fn connect_via_upstream(
    conn: &mut Connection,
    request: &Request,
    upstream: &HostPort,
) -> Result<()> {
    let mut server = match connect_to(&upstream.host, upstream.port).await {
        Ok(server) => server,
        Err(e) => {
            conn.send_error(404, "Not Found", "Unable to reach the upstream proxy.")
                .await
                .ok();
            return Err(e);
        }
    };

    // The parent proxy needs the full target back: authority form for
    // CONNECT, origin-absolute form for plain http.
    let path = if conn.connect_method {
        format!("{}:{}", request.host, request.port)
    } else {
        format!("http://{}:{}{}", request.host, request.port, request.path)
    };

    debug!(
        "[Upstream] {} {} via parent proxy {}",
        request.method, path, upstream
    );
    write_preamble(&mut server, &request.method, &path, &request.host).await?;
    conn.server = Some(server);
    Ok(())
}

async fn connect_direct(conn: &mut Connection, request: &Request) -> Result<()> {
    let mut server = match connect_to(&request.host, request.port).await {
        Ok(server) => server,
        Err(e) => {
            conn.send_error(
                500,
                "Unable to connect",
                "The proxy could not connect to the requested server.",
            )
            .await
            .ok();
            return Err(e);
        }
    };

    // A direct CONNECT sends nothing upstream; the client gets its 200
    // once the header block has been cleared.
    if !conn.connect_method {
        debug!(
            "[Upstream] {} {}:{}{} direct",
            request.method, request.host, request.port, request.path
        );
        write_preamble(&mut server, &request.method, &request.path, &request.host).await?;
    }
    conn.server = Some(server);
    Ok(())
}

/// `METHOD PATH HTTP/1.0` plus the headers every outbound request
/// carries. The protocol version is pinned to 1.0 on this side.
async fn write_preamble(
    server: &mut TcpStream,
    method: &str,
    path: &str,
    host: &str,
) -> Result<()> {
    let preamble = format!(
        "{method} {path} HTTP/1.0\r\nHost: {host}\r\nConnection: close\r\n"
    );
    server.write_all(preamble.as_bytes()).await?;
    Ok(())
}
