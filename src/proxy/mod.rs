/// Per-connection state
pub mod conn;
/// The per-connection pipeline
pub mod handler;
/// Dual-direction buffered relay
pub mod relay;
/// Direct, upstream-proxy and tunnel connectors
pub mod upstream;

pub use conn::*;
pub use handler::*;
pub use relay::*;
