//! Shared helpers for integration tests.
#![allow(dead_code)]

use anyhow::Result;
use std::net::SocketAddr;
use tinyproxy_rs::{Config, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Baseline test configuration: deterministic Via identity, short
/// idle timeout.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.listen = "127.0.0.1:0".to_string();
    config.via_name = Some("testproxy".to_string());
    config.idle_timeout = 30;
    config
}

/// Start a proxy with the given config and return its address.
pub async fn spawn_proxy(config: Config) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = Server::new(config)?;
    tokio::spawn(async move {
        if let Err(e) = server.serve(listener).await {
            eprintln!("proxy error: {}", e);
        }
    });
    Ok(addr)
}

/// Index just past the `\r\n\r\n` ending a header block.
pub fn header_block_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// A fake origin server for one connection. Captures the request
/// header block plus `body_len` further bytes, sends `response`, and
/// closes. The handle resolves to the captured request bytes.
pub async fn spawn_origin(
    response: &'static [u8],
    body_len: usize,
) -> Result<(SocketAddr, JoinHandle<Vec<u8>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.expect("origin accept");
        let mut captured = Vec::new();
        let mut buf = [0u8; 1024];
        while header_block_end(&captured).is_none() {
            let n = sock.read(&mut buf).await.expect("origin read");
            if n == 0 {
                break;
            }
            captured.extend_from_slice(&buf[..n]);
        }
        if let Some(end) = header_block_end(&captured) {
            while captured.len() < end + body_len {
                let n = sock.read(&mut buf).await.expect("origin body read");
                if n == 0 {
                    break;
                }
                captured.extend_from_slice(&buf[..n]);
            }
        }
        sock.write_all(response).await.expect("origin write");
        sock.shutdown().await.ok();
        captured
    });
    Ok((addr, handle))
}

/// An origin that echoes whatever it reads, for tunnel and CONNECT
/// tests. Serves any number of connections.
pub async fn spawn_echo_origin() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        loop {
            let (mut sock, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match sock.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if sock.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    Ok(addr)
}

/// Send a raw request through the proxy and collect everything the
/// proxy sends back until it closes the connection.
pub async fn roundtrip(proxy: SocketAddr, request: &[u8]) -> Result<Vec<u8>> {
    let mut client = TcpStream::connect(proxy).await?;
    client.write_all(request).await?;
    let mut response = Vec::new();
    client.read_to_end(&mut response).await?;
    Ok(response)
}

/// Read from `sock` until the end of a header block and return the
/// bytes read so far (payload bytes that arrived with them included).
pub async fn read_header_block(sock: &mut TcpStream) -> Result<Vec<u8>> {
    let mut collected = Vec::new();
    let mut buf = [0u8; 1024];
    while header_block_end(&collected).is_none() {
        let n = sock.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        collected.extend_from_slice(&buf[..n]);
    }
    Ok(collected)
}
