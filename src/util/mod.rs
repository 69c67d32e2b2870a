/// Error types and Result alias
pub mod error;
/// DNS resolution with a small in-process cache
pub mod dns_cache;
/// Socket helpers (connect, TCP tuning)
pub mod net;

pub use dns_cache::*;
pub use error::*;
pub use net::*;
