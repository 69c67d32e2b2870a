//! Domain filtering.
//!
//! The filter file holds one domain per line; blank lines and `#`
//! comments are skipped. A request host is refused when it equals a
//! listed domain or sits below one in the DNS tree.

use crate::util::{ProxyError, Result};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct DomainFilter {
    domains: Vec<String>,
}

impl DomainFilter {
    /// Load a filter list from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::Config(format!("cannot read filter file {}: {}", path.display(), e))
        })?;
        Ok(Self::from_lines(text.lines()))
    }

    fn from_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Self {
        let domains = lines
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| line.to_ascii_lowercase())
            .collect();
        Self { domains }
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// True when `host` is filtered and the request must be refused.
    pub fn is_blocked(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.domains.iter().any(|domain| {
            host == *domain
                || (host.len() > domain.len()
                    && host.ends_with(domain.as_str())
                    && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn filter(lines: &str) -> DomainFilter {
        DomainFilter::from_lines(lines.lines())
    }

    #[test]
    fn exact_and_subdomain_matches() {
        let f = filter("ads.example.com\ntracker.net\n");
        assert!(f.is_blocked("ads.example.com"));
        assert!(f.is_blocked("deep.ads.example.com"));
        assert!(f.is_blocked("TRACKER.NET"));
        assert!(!f.is_blocked("example.com"));
        assert!(!f.is_blocked("nottracker.net"));
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let f = filter("# blocked hosts\n\n  bad.example  \n# another\n");
        assert_eq!(f.len(), 1);
        assert!(f.is_blocked("bad.example"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "blocked.example").unwrap();
        let f = DomainFilter::load(file.path()).unwrap();
        assert!(f.is_blocked("blocked.example"));
        assert!(!f.is_blocked("fine.example"));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        assert!(DomainFilter::load(Path::new("/nonexistent/filter")).is_err());
    }
}
