//! Global connection statistics.
//!
//! Counters are process-wide atomics so every worker can record events
//! without coordination. The statistics page is served in place of
//! proxying when a request targets the configured stat host.

use crate::http::response::html_response;
use crate::{PACKAGE, VERSION};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

static STATS: Lazy<Stats> = Lazy::new(Stats::default);

/// Events a worker can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatEvent {
    /// A client connection was accepted.
    Open,
    /// A client connection finished, on any path.
    Closed,
    /// The connection died of a protocol or transport failure.
    BadConn,
    /// The request was refused by policy (ACL or filter).
    Denied,
}

#[derive(Debug, Default)]
struct Stats {
    opens: AtomicU64,
    closes: AtomicU64,
    bad_connections: AtomicU64,
    denied: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub opens: u64,
    pub closes: u64,
    pub bad_connections: u64,
    pub denied: u64,
}

/// Record one event.
pub fn update_stats(event: StatEvent) {
    let counter = match event {
        StatEvent::Open => &STATS.opens,
        StatEvent::Closed => &STATS.closes,
        StatEvent::BadConn => &STATS.bad_connections,
        StatEvent::Denied => &STATS.denied,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Read all counters.
pub fn snapshot() -> StatsSnapshot {
    StatsSnapshot {
        opens: STATS.opens.load(Ordering::Relaxed),
        closes: STATS.closes.load(Ordering::Relaxed),
        bad_connections: STATS.bad_connections.load(Ordering::Relaxed),
        denied: STATS.denied.load(Ordering::Relaxed),
    }
}

/// Render the statistics page as a complete HTTP response.
pub fn stats_response() -> String {
    let s = snapshot();
    let body = format!(
        "<html>\n<head><title>{PACKAGE} statistics</title></head>\n<body>\n\
         <h1>{PACKAGE}/{VERSION} statistics</h1>\n\
         <table>\n\
         <tr><td>Open connections</td><td>{}</td></tr>\n\
         <tr><td>Closed connections</td><td>{}</td></tr>\n\
         <tr><td>Bad connections</td><td>{}</td></tr>\n\
         <tr><td>Denied requests</td><td>{}</td></tr>\n\
         </table>\n</body>\n</html>\n",
        s.opens, s.closes, s.bad_connections, s.denied
    );
    html_response(&body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let before = snapshot();
        update_stats(StatEvent::Open);
        update_stats(StatEvent::Denied);
        update_stats(StatEvent::Closed);
        let after = snapshot();
        assert_eq!(after.opens, before.opens + 1);
        assert_eq!(after.denied, before.denied + 1);
        assert_eq!(after.closes, before.closes + 1);
        assert_eq!(after.bad_connections, before.bad_connections);
    }

    #[test]
    fn stats_page_is_a_complete_response() {
        let page = stats_response();
        assert!(page.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(page.contains("Open connections"));
        assert!(page.contains(PACKAGE));
    }
}
