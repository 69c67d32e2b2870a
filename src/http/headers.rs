//! Ordered, case-insensitively keyed header storage and the collector
//! that fills it from the client socket.

use crate::http::line::{read_line, strip_line_ending};
use crate::util::{ProxyError, Result};
use indexmap::IndexMap;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Hop-by-hop header names that are never forwarded upstream.
pub const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "host",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Separators recognised when splitting a `Connection` header value
/// into tokens.
const CONNECTION_TOKEN_SEPARATORS: &[char] = &[
    '(', ')', '<', '>', '@', ',', ';', ':', '\\', '"', '/', '[', ']', '?', '=', '{', '}', ' ',
    '\t',
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderEntry {
    /// Name exactly as it appeared on the wire; used for emission.
    name: String,
    value: String,
}

/// Header map keyed by the lowercased name, preserving insertion order
/// for emission. A duplicate name replaces the earlier value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap(IndexMap<String, HeaderEntry>);

impl HeaderMap {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Insert a header, replacing any earlier value stored under the
    /// same (case-insensitive) name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        self.0.insert(
            key,
            HeaderEntry {
                name,
                value: value.into(),
            },
        );
    }

    /// Look up a value by (case-insensitive) name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(|e| e.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    /// Remove a header and return its value. Keeps the relative order
    /// of the remaining entries.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0
            .shift_remove(&name.to_ascii_lowercase())
            .map(|e| e.value)
    }

    /// Iterate `(on-wire name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.values().map(|e| (e.name.as_str(), e.value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Read header lines from the client until the blank line, strictly.
///
/// A line without a `:` fails the whole operation; the connection is
/// then closed with no client-visible error.
pub async fn read_headers(stream: &mut TcpStream) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    loop {
        let raw = read_line(stream).await?;
        let line = strip_line_ending(&raw);
        if line.is_empty() {
            return Ok(headers);
        }

        let (name, value) = split_header_line(line)
            .ok_or_else(|| ProxyError::Protocol(format!("malformed header: {:?}", line)))?;
        headers.insert(name, value);
    }
}

/// Read and discard lines until a blank line, tolerating anything.
/// Used to clear the header block on paths that answer locally.
pub async fn drain_headers(stream: &mut TcpStream) -> Result<()> {
    loop {
        let raw = read_line(stream).await?;
        if strip_line_ending(&raw).is_empty() {
            return Ok(());
        }
    }
}

/// Discard a whole request: the header block and, when the headers
/// announced one, the `Content-Length` body. Clears the client socket
/// so the close after a locally generated response is orderly.
pub async fn drain_request(stream: &mut TcpStream) -> Result<()> {
    let mut content_length: Option<u64> = None;

    loop {
        let raw = read_line(stream).await?;
        let line = strip_line_ending(&raw);
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = split_header_line(line) {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().ok();
            }
        }
    }

    if let Some(mut remaining) = content_length {
        let mut chunk = [0u8; 4096];
        while remaining > 0 {
            let want = remaining.min(chunk.len() as u64) as usize;
            let n = stream.read(&mut chunk[..want]).await?;
            if n == 0 {
                break;
            }
            remaining -= n as u64;
        }
    }
    Ok(())
}

/// Split one header line at the first `:`, then swallow the run of
/// `:`, space and tab characters separating name from value.
fn split_header_line(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let name = &line[..colon];
    let value = line[colon..].trim_start_matches([':', ' ', '\t']);
    Some((name, value))
}

/// Tokenise a `Connection` header value. Every non-empty token names a
/// header that must not travel past this hop.
pub fn connection_tokens(value: &str) -> Vec<String> {
    value
        .split(CONNECTION_TOKEN_SEPARATORS)
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}
