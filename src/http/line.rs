//! Line-oriented reading from a TCP socket.
//!
//! The reader peeks at the socket and consumes exactly the bytes of
//! the returned line, never more. Later pipeline stages (most
//! importantly the CONNECT relay) therefore see the stream starting at
//! the first byte after the line, with nothing buffered away from them.

use crate::util::{ProxyError, Result};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Upper bound on a single protocol line.
pub const MAX_LINE_SIZE: usize = 64 * 1024;

const PEEK_CHUNK: usize = 512;

/// Read one line, terminator included.
///
/// Fails when the peer closes before any `\n` arrives, or when the
/// line exceeds [`MAX_LINE_SIZE`].
pub async fn read_line(stream: &mut TcpStream) -> Result<String> {
    let mut line: Vec<u8> = Vec::new();
    let mut chunk = [0u8; PEEK_CHUNK];

    loop {
        let n = stream.peek(&mut chunk).await?;
        if n == 0 {
            return Err(ProxyError::Protocol(
                "connection closed before end of line".into(),
            ));
        }

        // Consume up to and including the terminator if it is visible,
        // otherwise consume the whole peeked chunk and keep scanning.
        let newline = chunk[..n].iter().position(|&b| b == b'\n');
        let take = match newline {
            Some(pos) => pos + 1,
            None => n,
        };

        if line.len() + take > MAX_LINE_SIZE {
            return Err(ProxyError::Protocol("line too long".into()));
        }

        let start = line.len();
        line.resize(start + take, 0);
        stream.read_exact(&mut line[start..]).await?;

        if newline.is_some() {
            return String::from_utf8(line)
                .map_err(|_| ProxyError::Protocol("line is not valid UTF-8".into()));
        }
    }
}

/// Strip a trailing `\r\n` or `\n` from a line.
pub fn strip_line_ending(line: &str) -> &str {
    line.strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .unwrap_or(line)
}

/// Read lines until the first non-blank one and return it, ending
/// stripped. Blank lines ahead of a request line are insignificant.
pub async fn read_request_line(stream: &mut TcpStream) -> Result<String> {
    loop {
        let raw = read_line(stream).await?;
        let line = strip_line_ending(&raw);
        if !line.is_empty() {
            return Ok(line.to_string());
        }
    }
}
