//! Simple async DNS cache to reduce repeated lookups for popular hosts.

use crate::util::{ProxyError, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, trace};
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};

/// TTL for cached DNS entries.
const DEFAULT_TTL: Duration = Duration::from_secs(60);
/// Timeout for DNS lookup operations.
const DNS_TIMEOUT: Duration = Duration::from_secs(10);

static DNS_CACHE: Lazy<DnsCache> = Lazy::new(DnsCache::new);
static DNS_RESOLVER: Lazy<TokioAsyncResolver> =
    Lazy::new(|| TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()));

struct CacheEntry {
    addresses: Vec<IpAddr>,
    expires_at: Instant,
    next_index: usize,
}

struct DnsCache {
    inner: RwLock<HashMap<String, CacheEntry>>,
}

impl DnsCache {
    fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    async fn get(&self, host: &str) -> Option<IpAddr> {
        let cache = self.inner.read().await;
        let entry = cache.get(host)?;
        if Instant::now() > entry.expires_at || entry.addresses.is_empty() {
            return None;
        }
        let ip = entry.addresses[entry.next_index % entry.addresses.len()];
        trace!("[DNS] Cache hit for {} -> {}", host, ip);
        Some(ip)
    }

    async fn insert(&self, host: String, addresses: Vec<IpAddr>) {
        let mut cache = self.inner.write().await;
        cache.insert(
            host,
            CacheEntry {
                addresses,
                expires_at: Instant::now() + DEFAULT_TTL,
                next_index: 0,
            },
        );
    }

    async fn advance(&self, host: &str) {
        let mut cache = self.inner.write().await;
        if let Some(entry) = cache.get_mut(host) {
            entry.next_index = entry.next_index.wrapping_add(1);
        }
    }
}

/// Resolve a hostname to a socket address, with caching and timeout.
///
/// IP literals bypass both the cache and the resolver.
pub async fn resolve_host(host: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    if let Some(ip) = DNS_CACHE.get(host).await {
        DNS_CACHE.advance(host).await;
        return Ok(SocketAddr::new(ip, port));
    }

    let lookup = tokio::time::timeout(DNS_TIMEOUT, DNS_RESOLVER.lookup_ip(host))
        .await
        .map_err(|_| {
            ProxyError::Dns(format!(
                "DNS resolution timeout ({}s) for {}",
                DNS_TIMEOUT.as_secs(),
                host
            ))
        })?
        .map_err(|err| ProxyError::Dns(format!("DNS resolution failed for {}: {}", host, err)))?;

    let mut addresses: Vec<IpAddr> = lookup.iter().collect();

    if addresses.is_empty() {
        return Err(ProxyError::Dns(format!("no address found for {}", host)));
    }

    // Sort to keep stability across runs (helps caching)
    addresses.sort_unstable_by_key(|ip| match ip {
        IpAddr::V4(v4) => (0, v4.octets().to_vec()),
        IpAddr::V6(v6) => (1, v6.octets().to_vec()),
    });

    debug!(
        "[DNS] Resolved {} -> {} entries (ttl={}s)",
        host,
        addresses.len(),
        DEFAULT_TTL.as_secs()
    );

    let first = addresses[0];
    DNS_CACHE.insert(host.to_string(), addresses).await;
    DNS_CACHE.advance(host).await;
    Ok(SocketAddr::new(first, port))
}
