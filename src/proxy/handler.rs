//! The per-connection pipeline.
//!
//! One worker task per accepted client walks the states ACL check,
//! request parse, upstream connect, header rewrite, response start and
//! relay, carrying the single-status-line latch through every stage.
//! Teardown is the worker returning; dropping the sockets closes them.

use crate::http::headers::{
    HOP_BY_HOP_HEADERS, connection_tokens, drain_headers, drain_request, read_headers,
};
use crate::http::line::{read_line, read_request_line, strip_line_ending};
use crate::http::request::parse_request_line;
use crate::http::response::connect_established;
use crate::proxy::conn::Connection;
use crate::proxy::relay::{MAX_BUFFER_SIZE, relay};
use crate::proxy::upstream;
use crate::server::ProxyContext;
use crate::stats::{StatEvent, stats_response, update_stats};
use crate::util::{ProxyError, Result};
use crate::{PACKAGE, VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Entry point for one accepted client socket.
pub async fn handle_connection(
    client: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ProxyContext>,
) -> Result<()> {
    update_stats(StatEvent::Open);
    let mut conn = Connection::new(client, peer);
    let result = run_pipeline(&mut conn, &ctx).await;
    update_stats(StatEvent::Closed);
    result
}

async fn run_pipeline(conn: &mut Connection, ctx: &ProxyContext) -> Result<()> {
    if !ctx.acl.permits(conn.client_addr.ip()) {
        info!("[Proxy] refusing connection from {}", conn.client_addr);
        update_stats(StatEvent::Denied);
        conn.send_error(
            403,
            "Access denied",
            "This proxy is not configured to service requests from your host.",
        )
        .await
        .ok();
        drain_request(&mut conn.client).await.ok();
        return Ok(());
    }

    // Fixed tunnel: opaque relay, no HTTP handling at all.
    if let Some(tunnel) = &ctx.config.tunnel {
        if let Err(e) = upstream::establish_tunnel(conn, tunnel).await {
            update_stats(StatEvent::BadConn);
            return Err(e);
        }
        return run_relay(conn, ctx).await;
    }

    let line = match read_request_line(&mut conn.client).await {
        Ok(line) => line,
        Err(e) => {
            update_stats(StatEvent::BadConn);
            return Err(e);
        }
    };
    debug!("[Proxy] request from {}: {:?}", conn.client_addr, line);

    let parsed = match parse_request_line(&line) {
        Ok(parsed) => parsed,
        Err(e) => {
            update_stats(StatEvent::BadConn);
            conn.send_error(
                400,
                "Bad Request",
                "The request could not be understood by the proxy.",
            )
            .await
            .ok();
            if conn.response_sent {
                drain_request(&mut conn.client).await.ok();
            }
            return Err(e);
        }
    };
    conn.connect_method = parsed.connect_method;
    if let Some(version) = parsed.version {
        conn.version = version;
    }
    let request = parsed.request;

    // Requests for the stat host are answered locally.
    if let Some(stat_host) = &ctx.config.stat_host {
        if request.host.eq_ignore_ascii_case(stat_host) {
            info!("[Proxy] serving statistics page to {}", conn.client_addr);
            conn.send_response(&stats_response()).await.ok();
            drain_request(&mut conn.client).await.ok();
            return Ok(());
        }
    }

    if let Some(filter) = &ctx.filter {
        if filter.is_blocked(&request.host) {
            info!(
                "[Filter] refusing {:?} for {}",
                request.host, conn.client_addr
            );
            update_stats(StatEvent::Denied);
            conn.send_error(
                404,
                "Not Found",
                "The requested domain is not serviced by this proxy.",
            )
            .await
            .ok();
            drain_request(&mut conn.client).await.ok();
            return Ok(());
        }
    }

    if let Err(e) = upstream::connect_upstream(conn, &request, &ctx.config).await {
        update_stats(StatEvent::BadConn);
        drain_request(&mut conn.client).await.ok();
        return Err(e);
    }

    if let Err(e) = process_client_headers(conn, ctx).await {
        // Malformed headers close the connection with no error page.
        update_stats(StatEvent::BadConn);
        return Err(e);
    }
    drop(request);

    if conn.response_sent {
        return Ok(());
    }

    if conn.connect_method && ctx.config.upstream.is_none() {
        conn.send_response(&connect_established()).await?;
    } else if let Err(e) = process_server_headers(conn).await {
        update_stats(StatEvent::BadConn);
        return Err(e);
    }

    run_relay(conn, ctx).await
}

/// Read the client header block and rewrite it onto the server socket.
///
/// On paths where nothing may be written upstream (error already
/// answered, no server socket, direct CONNECT) the block is read and
/// discarded so the socket is clear for whatever follows.
async fn process_client_headers(conn: &mut Connection, ctx: &ProxyContext) -> Result<()> {
    let rewrite = conn.server.is_some()
        && !conn.response_sent
        && (!conn.connect_method || ctx.config.upstream.is_some());
    if !rewrite {
        drain_headers(&mut conn.client).await.ok();
        return Ok(());
    }

    let mut headers = read_headers(&mut conn.client).await?;

    // Headers named by the Connection header are hop-scoped too.
    if let Some(value) = headers.remove("connection") {
        for token in connection_tokens(&value) {
            headers.remove(&token);
        }
    }

    // Captured for the body forward below; the header itself travels.
    let content_length: Option<i64> = headers
        .get("content-length")
        .and_then(|v| v.trim().parse().ok());

    let via_value = match headers.remove("via") {
        Some(existing) => format!(
            "{}, {} {} ({}/{})",
            existing, conn.version, ctx.via_ident, PACKAGE, VERSION
        ),
        None => format!("{} {} ({}/{})", conn.version, ctx.via_ident, PACKAGE, VERSION),
    };

    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }

    let mut block = format!("Via: {}\r\n", via_value);
    for (name, value) in headers.iter() {
        if !ctx.anonymous.allows(name) {
            continue;
        }
        block.push_str(name);
        block.push_str(": ");
        block.push_str(value);
        block.push_str("\r\n");
    }
    if ctx.config.my_domain.is_some() {
        block.push_str(&format!("X-Tinyproxy: {}\r\n", conn.client_addr.ip()));
    }
    block.push_str("\r\n");

    let Some(server) = conn.server.as_mut() else {
        return Ok(());
    };
    server.write_all(block.as_bytes()).await?;

    if let Some(length) = content_length {
        if length >= 0 {
            forward_client_body(conn, length as u64).await?;
        }
    }
    Ok(())
}

/// Stream `length` request-body bytes from the client towards the
/// server. The client side is always read; forwarding stops once a
/// local response has pre-empted the exchange.
async fn forward_client_body(conn: &mut Connection, length: u64) -> Result<()> {
    let cap = std::cmp::min(MAX_BUFFER_SIZE as u64, length) as usize;
    let mut chunk = vec![0u8; cap.max(1)];
    let mut remaining = length;

    while remaining > 0 {
        let want = std::cmp::min(remaining, chunk.len() as u64) as usize;
        let n = conn.client.read(&mut chunk[..want]).await?;
        if n == 0 {
            return Err(ProxyError::Protocol(
                "client closed before the request body was complete".into(),
            ));
        }
        if !conn.response_sent {
            if let Some(server) = conn.server.as_mut() {
                server.write_all(&chunk[..n]).await?;
            }
        }
        remaining -= n as u64;
    }
    Ok(())
}

/// Copy the server's response header block to the client verbatim,
/// terminating blank line included.
async fn process_server_headers(conn: &mut Connection) -> Result<()> {
    let Connection {
        client,
        server,
        response_sent,
        ..
    } = conn;
    let server = server.as_mut().ok_or_else(|| {
        ProxyError::Protocol("no server connection to read response headers from".into())
    })?;

    loop {
        let line = read_line(server).await?;
        client.write_all(line.as_bytes()).await?;
        *response_sent = true;
        if strip_line_ending(&line).is_empty() {
            return Ok(());
        }
    }
}

async fn run_relay(conn: &mut Connection, ctx: &ProxyContext) -> Result<()> {
    let mut server = conn
        .server
        .take()
        .ok_or_else(|| ProxyError::Protocol("relay requires a server connection".into()))?;
    let (to_server, to_client) =
        relay(&mut conn.client, &mut server, ctx.config.idle_timeout()).await?;
    info!(
        "[Proxy] closed {} ({} bytes out, {} bytes in)",
        conn.client_addr, to_server, to_client
    );
    Ok(())
}
