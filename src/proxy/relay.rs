//! Dual-direction buffered relay.
//!
//! Both sockets are driven through the readiness API: a socket is
//! read-interesting while its ingress buffer has room and
//! write-interesting while the buffer headed its way holds data. The
//! loop sleeps at most until the idle deadline measured from the last
//! readiness wake. On exit whatever is left in the buffers is flushed
//! to the respective destination, best effort.

use crate::util::Result;
use bytes::{Buf, BytesMut};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, Interest};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// Capacity of each relay buffer.
pub const MAX_BUFFER_SIZE: usize = 96 * 1024;

/// Fixed-capacity byte buffer between two sockets. Reads append at the
/// tail, writes drain from the head; the length never exceeds
/// [`MAX_BUFFER_SIZE`].
#[derive(Debug, Default)]
pub struct RelayBuffer {
    data: BytesMut,
}

impl RelayBuffer {
    pub fn new() -> Self {
        Self {
            data: BytesMut::with_capacity(MAX_BUFFER_SIZE),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn has_room(&self) -> bool {
        self.data.len() < MAX_BUFFER_SIZE
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Non-blocking read from `stream` into the free tail space.
    pub fn fill_from(&mut self, stream: &TcpStream) -> io::Result<usize> {
        let old = self.data.len();
        let room = MAX_BUFFER_SIZE - old;
        self.data.resize(old + room, 0);
        match stream.try_read(&mut self.data[old..]) {
            Ok(n) => {
                self.data.truncate(old + n);
                Ok(n)
            }
            Err(e) => {
                self.data.truncate(old);
                Err(e)
            }
        }
    }

    /// Non-blocking write of the head to `stream`; whatever cannot be
    /// written right now stays buffered.
    pub fn drain_to(&mut self, stream: &TcpStream) -> io::Result<usize> {
        let n = stream.try_write(&self.data)?;
        self.data.advance(n);
        Ok(n)
    }
}

/// Why the relay loop stopped. Worth a log line either way; never an
/// error for the pipeline.
enum RelayEnd {
    PeerClosed(&'static str),
    IdleTimeout,
    TransportError(&'static str, io::Error),
}

/// Relay bytes between client and server until a peer closes, a
/// transport error occurs, or the idle timeout elapses. Returns the
/// byte totals moved in each direction (client→server, server→client).
pub async fn relay(
    client: &mut TcpStream,
    server: &mut TcpStream,
    idle_timeout: Duration,
) -> Result<(u64, u64)> {
    let mut cbuffer = RelayBuffer::new(); // client -> server
    let mut sbuffer = RelayBuffer::new(); // server -> client
    let mut to_server: u64 = 0;
    let mut to_client: u64 = 0;
    let mut last_access = Instant::now();

    let end = 'outer: loop {
        let client_interest = interest_for(cbuffer.has_room(), !sbuffer.is_empty());
        let server_interest = interest_for(sbuffer.has_room(), !cbuffer.is_empty());
        let deadline = last_access + idle_timeout;

        tokio::select! {
            ready = client.ready(client_interest.unwrap_or(Interest::READABLE)),
                    if client_interest.is_some() => {
                let ready = match ready {
                    Ok(ready) => ready,
                    Err(e) => break 'outer RelayEnd::TransportError("client", e),
                };
                last_access = Instant::now();
                if ready.is_readable() && cbuffer.has_room() {
                    match cbuffer.fill_from(client) {
                        Ok(0) => break 'outer RelayEnd::PeerClosed("client"),
                        Ok(n) => {
                            to_server += n as u64;
                            trace!("[Relay] {} bytes client -> buffer", n);
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                        Err(e) => break 'outer RelayEnd::TransportError("client", e),
                    }
                }
                if ready.is_writable() && !sbuffer.is_empty() {
                    match sbuffer.drain_to(client) {
                        Ok(n) => trace!("[Relay] {} bytes buffer -> client", n),
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                        Err(e) => break 'outer RelayEnd::TransportError("client", e),
                    }
                }
            }
            ready = server.ready(server_interest.unwrap_or(Interest::READABLE)),
                    if server_interest.is_some() => {
                let ready = match ready {
                    Ok(ready) => ready,
                    Err(e) => break 'outer RelayEnd::TransportError("server", e),
                };
                last_access = Instant::now();
                if ready.is_readable() && sbuffer.has_room() {
                    match sbuffer.fill_from(server) {
                        Ok(0) => break 'outer RelayEnd::PeerClosed("server"),
                        Ok(n) => {
                            to_client += n as u64;
                            trace!("[Relay] {} bytes server -> buffer", n);
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                        Err(e) => break 'outer RelayEnd::TransportError("server", e),
                    }
                }
                if ready.is_writable() && !cbuffer.is_empty() {
                    match cbuffer.drain_to(server) {
                        Ok(n) => trace!("[Relay] {} bytes buffer -> server", n),
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                        Err(e) => break 'outer RelayEnd::TransportError("server", e),
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                break 'outer RelayEnd::IdleTimeout;
            }
        }
    };

    match &end {
        RelayEnd::PeerClosed(who) => debug!("[Relay] {} closed the connection", who),
        RelayEnd::IdleTimeout => {
            info!("[Relay] idle timeout after {}s", idle_timeout.as_secs())
        }
        RelayEnd::TransportError(who, e) => debug!("[Relay] {} transport error: {}", who, e),
    }

    // Best-effort drain: each buffer goes to its intended destination.
    if !sbuffer.is_empty() {
        let _ = client.write_all(sbuffer.as_slice()).await;
    }
    if !cbuffer.is_empty() {
        let _ = server.write_all(cbuffer.as_slice()).await;
    }

    Ok((to_server, to_client))
}

/// Build the interest set for one socket, or `None` when there is
/// nothing to wait for on it.
fn interest_for(want_read: bool, want_write: bool) -> Option<Interest> {
    match (want_read, want_write) {
        (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
        (true, false) => Some(Interest::READABLE),
        (false, true) => Some(Interest::WRITABLE),
        (false, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_combinations() {
        assert!(interest_for(false, false).is_none());
        assert_eq!(interest_for(true, false), Some(Interest::READABLE));
        assert_eq!(interest_for(false, true), Some(Interest::WRITABLE));
        assert_eq!(
            interest_for(true, true),
            Some(Interest::READABLE | Interest::WRITABLE)
        );
    }

    #[tokio::test]
    async fn buffer_respects_capacity() {
        use tokio::net::{TcpListener, TcpStream};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut writer = TcpStream::connect(addr).await.unwrap();
        let (reader, _) = listener.accept().await.unwrap();

        writer.write_all(&[0x42u8; 1024]).await.unwrap();
        writer.flush().await.unwrap();

        let mut buf = RelayBuffer::new();
        assert!(buf.has_room());
        reader.readable().await.unwrap();
        let mut total = 0;
        while total < 1024 {
            match buf.fill_from(&reader) {
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    reader.readable().await.unwrap();
                }
                Err(e) => panic!("read error: {}", e),
            }
        }
        assert_eq!(buf.len(), 1024);
        assert!(buf.len() <= MAX_BUFFER_SIZE);
        assert_eq!(buf.as_slice()[0], 0x42);
    }
}
