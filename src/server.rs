//! Accept loop and the immutable per-worker context.

use crate::acl::Acl;
use crate::anonymous::AnonymousPolicy;
use crate::config::Config;
use crate::filter::DomainFilter;
use crate::proxy::handler::handle_connection;
use crate::util::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Instrument, debug, error, info, info_span};

/// Everything a worker needs, materialized once at startup. Shared
/// read-only between all workers; the hot path takes no locks.
pub struct ProxyContext {
    pub config: Config,
    pub acl: Acl,
    pub filter: Option<DomainFilter>,
    pub anonymous: AnonymousPolicy,
    /// Node name advertised in `Via` headers.
    pub via_ident: String,
}

impl ProxyContext {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let acl = Acl::parse(&config.acl)?;
        let filter = match &config.filter_file {
            Some(path) => {
                let filter = DomainFilter::load(path)?;
                info!("[Server] domain filter active, {} entries", filter.len());
                Some(filter)
            }
            None => None,
        };
        let anonymous = AnonymousPolicy::new(&config.anonymous);
        let via_ident = config.via_name.clone().unwrap_or_else(local_hostname);

        Ok(Self {
            config,
            acl,
            filter,
            anonymous,
            via_ident,
        })
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// The proxy server: binds, accepts, and hands every connection to its
/// own worker task.
pub struct Server {
    ctx: Arc<ProxyContext>,
}

impl Server {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            ctx: Arc::new(ProxyContext::new(config)?),
        })
    }

    pub fn context(&self) -> Arc<ProxyContext> {
        Arc::clone(&self.ctx)
    }

    /// Bind the configured listen address and serve forever.
    pub async fn listen(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.ctx.config.listen).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("[Server] listening on {}", listener.local_addr()?);

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("[Server] new connection from {}", peer);
                    let ctx = Arc::clone(&self.ctx);
                    let span = info_span!("proxy.connection", peer_addr = %peer);
                    tokio::spawn(
                        async move {
                            if let Err(e) = handle_connection(stream, peer, ctx).await {
                                debug!("[Server] connection from {} ended: {}", peer, e);
                            }
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    error!("[Server] accept error: {}", e);
                }
            }
        }
    }
}
