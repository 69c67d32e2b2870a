//! Runtime configuration.
//!
//! Loaded once at startup (TOML file plus CLI overrides) and handed to
//! every worker as part of an immutable context; nothing here changes
//! while connections are in flight.

use crate::util::{ProxyError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A `host:port` pair for upstream and tunnel destinations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl FromStr for HostPort {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ProxyError::Config(format!("expected host:port, got {:?}", s)))?;
        if host.is_empty() {
            return Err(ProxyError::Config(format!("empty host in {:?}", s)));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| ProxyError::Config(format!("bad port in {:?}", s)))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl std::fmt::Display for HostPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Proxy configuration. Every field has a workable default so an empty
/// file (or no file at all) yields a running proxy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the accept loop binds to.
    pub listen: String,
    /// Relay idle bound, in seconds.
    pub idle_timeout: u64,
    /// Optional parent proxy every request is chained through.
    pub upstream: Option<HostPort>,
    /// Optional fixed TCP redirection; replaces HTTP handling entirely.
    pub tunnel: Option<HostPort>,
    /// Requests whose host equals this are answered with the
    /// statistics page.
    pub stat_host: Option<String>,
    /// Domain filter list file; filtering is enabled iff set.
    pub filter_file: Option<PathBuf>,
    /// Enables `X-Tinyproxy` client-identity emission.
    pub my_domain: Option<String>,
    /// Overrides the node hostname used in `Via` headers.
    pub via_name: Option<String>,
    /// Anonymous-mode header allow-list; the mode is on iff non-empty.
    pub anonymous: Vec<String>,
    /// Access-control rules, `"allow <ip|cidr>"` / `"deny <ip|cidr>"`.
    pub acl: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8888".to_string(),
            idle_timeout: 600,
            upstream: None,
            tunnel: None,
            stat_host: None,
            filter_file: None,
            my_domain: None,
            via_name: None,
            anonymous: Vec::new(),
            acl: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| ProxyError::Config(format!("bad config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the pipeline cannot serve.
    pub fn validate(&self) -> Result<()> {
        if self.upstream.is_some() && self.tunnel.is_some() {
            return Err(ProxyError::Config(
                "upstream and tunnel are mutually exclusive".into(),
            ));
        }
        if self.idle_timeout == 0 {
            return Err(ProxyError::Config("idle_timeout must be positive".into()));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.idle_timeout)
    }
}
