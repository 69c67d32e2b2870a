use thiserror::Error;

/// Proxy pipeline errors
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("DNS error: {0}")]
    Dns(String),

    #[error("Connect error: {0}")]
    Connect(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ProxyError>;
