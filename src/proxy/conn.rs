//! Per-connection state.

use crate::http::request::HttpVersion;
use crate::http::response::error_page;
use crate::util::Result;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// State carried through the pipeline for one accepted client.
pub struct Connection {
    pub client: TcpStream,
    /// Upstream socket; absent until a connector succeeds.
    pub server: Option<TcpStream>,
    pub client_addr: SocketAddr,
    /// HTTP version observed on the client request line.
    pub version: HttpVersion,
    pub connect_method: bool,
    /// Latch: set once any status line has been written to the client.
    /// Every later stage must check it before writing protocol bytes.
    pub response_sent: bool,
}

impl Connection {
    pub fn new(client: TcpStream, client_addr: SocketAddr) -> Self {
        Self {
            client,
            server: None,
            client_addr,
            version: HttpVersion::default(),
            connect_method: false,
            response_sent: false,
        }
    }

    /// Send an error page unless a response is already under way.
    pub async fn send_error(&mut self, code: u16, title: &str, message: &str) -> Result<()> {
        if self.response_sent {
            return Ok(());
        }
        self.response_sent = true;
        let page = error_page(code, title, message);
        self.client.write_all(page.as_bytes()).await?;
        Ok(())
    }

    /// Send a locally built complete response (stats page, CONNECT
    /// success) under the same single-status-line latch.
    pub async fn send_response(&mut self, response: &str) -> Result<()> {
        if self.response_sent {
            return Ok(());
        }
        self.response_sent = true;
        self.client.write_all(response.as_bytes()).await?;
        Ok(())
    }
}
