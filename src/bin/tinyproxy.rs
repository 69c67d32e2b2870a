//! tinyproxy-rs binary

use anyhow::{Context, Result};
use std::path::PathBuf;
use tinyproxy_rs::server::Server;
use tinyproxy_rs::{Config, PACKAGE, VERSION};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Parse command line arguments
    let mut args = std::env::args().skip(1);
    let mut config_file: Option<PathBuf> = None;
    let mut listen_addr: Option<String> = None;
    let mut idle_timeout: Option<u64> = None;
    let mut upstream: Option<String> = None;
    let mut tunnel: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                config_file = Some(PathBuf::from(
                    args.next().context("Expected file after -c")?,
                ));
            }
            "-l" | "--listen" => {
                listen_addr = Some(args.next().context("Expected listen address after -l")?);
            }
            "-t" | "--idle-timeout" => {
                let value = args.next().context("Expected seconds after -t")?;
                idle_timeout = Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid value for -t: {value}"))?,
                );
            }
            "-u" | "--upstream" => {
                upstream = Some(args.next().context("Expected host:port after -u")?);
            }
            "--tunnel" => {
                tunnel = Some(args.next().context("Expected host:port after --tunnel")?);
            }
            "-V" | "--version" => {
                println!("{PACKAGE} {VERSION}");
                return Ok(());
            }
            "-h" | "--help" => {
                println!("Usage: tinyproxy [OPTIONS]");
                println!("Options:");
                println!("  -c, --config FILE        TOML configuration file");
                println!("  -l, --listen ADDRESS     Listen address (default: 127.0.0.1:8888)");
                println!("  -t, --idle-timeout SECS  Relay idle timeout (default: 600)");
                println!("  -u, --upstream HOST:PORT Chain all requests through a parent proxy");
                println!("      --tunnel HOST:PORT   Redirect all connections to a fixed target");
                println!("  -V, --version            Show version");
                println!("  -h, --help               Show this help message");
                return Ok(());
            }
            _ => {
                return Err(anyhow::anyhow!("Unknown argument: {}", arg));
            }
        }
    }

    // Load the file first, then let flags override it.
    let mut config = match &config_file {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(listen) = listen_addr {
        config.listen = listen;
    }
    if let Some(secs) = idle_timeout {
        config.idle_timeout = secs;
    }
    if let Some(upstream) = upstream {
        config.upstream = Some(upstream.parse()?);
    }
    if let Some(tunnel) = tunnel {
        config.tunnel = Some(tunnel.parse()?);
    }

    info!("[Server] {PACKAGE} v{VERSION}");
    let server = Server::new(config).context("Failed to initialize proxy")?;

    tokio::select! {
        result = server.listen() => {
            result.context("Proxy server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("[Server] interrupted, shutting down");
        }
    }

    Ok(())
}
