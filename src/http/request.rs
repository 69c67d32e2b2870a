//! Request-line parsing and URL extraction.

use crate::util::{ProxyError, Result};

/// Default port for `http://` targets.
pub const HTTP_PORT: u16 = 80;
/// Default port for CONNECT targets.
pub const HTTPS_PORT: u16 = 443;

/// A parsed request target. Lives from the request-line parser until
/// the upstream request has been written; the relay never sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Normalized protocol token (`HTTP/x.y` uppercased) when the
    /// client sent one that looked like HTTP.
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub path: String,
}

/// Client HTTP version as observed on the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpVersion {
    pub major: u32,
    pub minor: u32,
}

impl Default for HttpVersion {
    fn default() -> Self {
        Self { major: 1, minor: 0 }
    }
}

impl std::fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Outcome of parsing the request line.
#[derive(Debug)]
pub struct ParsedRequestLine {
    pub request: Request,
    pub connect_method: bool,
    /// Version parsed from the protocol token, when present and well formed.
    pub version: Option<HttpVersion>,
}

/// Parse `METHOD SP URL SP VERSION`.
///
/// Understands absolute `http://` URLs and `CONNECT` authority
/// targets; anything else is a protocol error the caller answers with
/// `400`.
pub fn parse_request_line(line: &str) -> Result<ParsedRequestLine> {
    let mut tokens = line.split_whitespace();
    let method = tokens
        .next()
        .ok_or_else(|| ProxyError::Protocol("empty request line".into()))?;
    let url = tokens
        .next()
        .ok_or_else(|| ProxyError::Protocol(format!("bad request line: {:?}", line)))?;
    let protocol = tokens.next().unwrap_or("");

    let mut connect_method = false;
    let has_http_scheme = url
        .get(..7)
        .is_some_and(|p| p.eq_ignore_ascii_case("http://"));
    let (host, port, path) = if has_http_scheme {
        // Normalize the scheme before splitting it off.
        let mut lowered = url.to_string();
        lowered.replace_range(..4, &url[..4].to_ascii_lowercase());
        extract_http_url(&lowered)?
    } else if method == "CONNECT" {
        connect_method = true;
        let (host, port) = extract_connect_target(url)?;
        (host, port, String::new())
    } else {
        return Err(ProxyError::Protocol(format!("unknown URL type: {:?}", url)));
    };

    let mut normalized_protocol = protocol.to_string();
    let mut version = None;
    if protocol
        .get(..4)
        .is_some_and(|p| p.eq_ignore_ascii_case("http"))
    {
        normalized_protocol.replace_range(..4, "HTTP");
        version = parse_http_version(&normalized_protocol);
    }

    Ok(ParsedRequestLine {
        request: Request {
            method: method.to_string(),
            protocol: normalized_protocol,
            host,
            port,
            path,
        },
        connect_method,
        version,
    })
}

/// Split `http://HOST[:PORT][/PATH]` into its parts.
///
/// `HOST` may not contain `:` or `/`; the path keeps its leading `/`
/// and defaults to `/`; the port defaults to 80.
pub fn extract_http_url(url: &str) -> Result<(String, u16, String)> {
    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| ProxyError::Protocol(format!("not an http URL: {:?}", url)))?;

    let (authority, path) = match rest.find('/') {
        Some(pos) => (&rest[..pos], rest[pos..].to_string()),
        None => (rest, "/".to_string()),
    };

    let (host, port) = match authority.find(':') {
        Some(pos) => {
            let port = authority[pos + 1..]
                .parse::<u16>()
                .map_err(|_| ProxyError::Protocol(format!("bad port in URL: {:?}", url)))?;
            (&authority[..pos], port)
        }
        None => (authority, HTTP_PORT),
    };

    if host.is_empty() {
        return Err(ProxyError::Protocol(format!("empty host in URL: {:?}", url)));
    }

    Ok((host.to_string(), port, path))
}

/// Split a CONNECT authority target `HOST[:PORT]`, port defaulting to 443.
pub fn extract_connect_target(target: &str) -> Result<(String, u16)> {
    let (host, port) = match target.find(':') {
        Some(pos) => {
            let port = target[pos + 1..]
                .parse::<u16>()
                .map_err(|_| ProxyError::Protocol(format!("bad port in target: {:?}", target)))?;
            (&target[..pos], port)
        }
        None => (target, HTTPS_PORT),
    };

    if host.is_empty() {
        return Err(ProxyError::Protocol(format!(
            "empty host in target: {:?}",
            target
        )));
    }

    Ok((host.to_string(), port))
}

/// Parse `HTTP/<major>.<minor>`. Malformed versions are tolerated and
/// leave the connection at its 1.0 default.
fn parse_http_version(protocol: &str) -> Option<HttpVersion> {
    let version = protocol.strip_prefix("HTTP/")?;
    let (major, minor) = version.split_once('.')?;
    Some(HttpVersion {
        major: major.parse().ok()?,
        minor: minor.parse().ok()?,
    })
}
