/// CRLF line reading over a TCP socket
pub mod line;
/// Request-line parsing and URL extraction
pub mod request;
/// Ordered, case-insensitively keyed header map and the header collector
pub mod headers;
/// Locally generated responses (error pages, CONNECT success, stats page)
pub mod response;

pub use headers::*;
pub use line::*;
pub use request::*;
pub use response::*;
