//! Locally generated HTTP responses.
//!
//! Everything the proxy says to the client on its own behalf is built
//! here: error pages, the CONNECT success reply and the statistics
//! page. All of it is HTTP/1.0 with `Connection: close` semantics.

use crate::{PACKAGE, VERSION};

/// Build a complete error response: status line, minimal headers, and
/// a small HTML body.
pub fn error_page(code: u16, title: &str, message: &str) -> String {
    let body = format!(
        "<html>\n<head><title>{code} {title}</title></head>\n\
         <body>\n<h1>{title}</h1>\n<p>{message}</p>\n<hr />\n\
         <p><em>Generated by {PACKAGE}/{VERSION}</em></p>\n</body>\n</html>\n"
    );
    format!(
        "HTTP/1.0 {code} {title}\r\n\
         Server: {PACKAGE}/{VERSION}\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n{body}",
        body.len()
    )
}

/// The reply to a direct CONNECT once the origin socket is open.
pub fn connect_established() -> String {
    format!(
        "HTTP/1.0 200 Connection established\r\n\
         Proxy-agent: {PACKAGE}/{VERSION}\r\n\
         \r\n"
    )
}

/// Wrap an HTML body in a complete 200 response. Used for the
/// statistics page.
pub fn html_response(body: &str) -> String {
    format!(
        "HTTP/1.0 200 OK\r\n\
         Server: {PACKAGE}/{VERSION}\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n{body}",
        body.len()
    )
}
