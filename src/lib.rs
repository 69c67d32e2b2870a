//! A small HTTP/1.0 forward proxy.
//!
//! Accepts client connections, parses plain HTTP requests and CONNECT
//! tunnel requests, rewrites headers, connects upstream (directly,
//! through a parent proxy, or through a fixed TCP tunnel) and relays
//! bytes in both directions until a peer closes or the idle timeout
//! elapses.

pub mod acl;
pub mod anonymous;
pub mod config;
pub mod filter;
pub mod http;
pub mod proxy;
pub mod server;
pub mod stats;
pub mod util;

pub use config::Config;
pub use server::{ProxyContext, Server};
pub use util::error::{ProxyError, Result};

/// Package name, as advertised in `Via`, `Proxy-agent` and `Server` headers.
pub const PACKAGE: &str = env!("CARGO_PKG_NAME");
/// Package version, advertised alongside [`PACKAGE`].
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
