//! Client access control by source address.
//!
//! Rules are evaluated in order and the first match wins. An empty
//! rule set permits everyone; once rules exist, an unmatched client is
//! denied.

use crate::util::{ProxyError, Result};
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AclAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone)]
struct AclRule {
    action: AclAction,
    network: IpAddr,
    prefix_len: u8,
}

impl AclRule {
    fn matches(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let net = u32::from_be_bytes(net.octets());
                let ip = u32::from_be_bytes(ip.octets());
                let mask = prefix_mask_v4(self.prefix_len);
                net & mask == ip & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let net = u128::from_be_bytes(net.octets());
                let ip = u128::from_be_bytes(ip.octets());
                let mask = prefix_mask_v6(self.prefix_len);
                net & mask == ip & mask
            }
            _ => false,
        }
    }
}

fn prefix_mask_v4(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    }
}

fn prefix_mask_v6(prefix_len: u8) -> u128 {
    if prefix_len == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix_len))
    }
}

/// Ordered access-control list over client IPs.
#[derive(Debug, Clone, Default)]
pub struct Acl {
    rules: Vec<AclRule>,
}

impl Acl {
    /// Parse rule strings of the form `allow <ip|cidr>` / `deny <ip|cidr>`.
    pub fn parse(rules: &[String]) -> Result<Self> {
        let mut parsed = Vec::with_capacity(rules.len());
        for rule in rules {
            parsed.push(parse_rule(rule)?);
        }
        Ok(Self { rules: parsed })
    }

    /// Decide whether a client at `ip` may use the proxy.
    pub fn permits(&self, ip: IpAddr) -> bool {
        for rule in &self.rules {
            if rule.matches(ip) {
                return rule.action == AclAction::Allow;
            }
        }
        self.rules.is_empty()
    }
}

fn parse_rule(rule: &str) -> Result<AclRule> {
    let mut tokens = rule.split_whitespace();
    let action = match tokens.next() {
        Some(word) if word.eq_ignore_ascii_case("allow") => AclAction::Allow,
        Some(word) if word.eq_ignore_ascii_case("deny") => AclAction::Deny,
        _ => {
            return Err(ProxyError::Config(format!(
                "ACL rule must start with allow/deny: {:?}",
                rule
            )));
        }
    };
    let target = tokens
        .next()
        .ok_or_else(|| ProxyError::Config(format!("ACL rule has no address: {:?}", rule)))?;
    if tokens.next().is_some() {
        return Err(ProxyError::Config(format!(
            "trailing junk in ACL rule: {:?}",
            rule
        )));
    }

    let (addr, prefix_len) = match target.split_once('/') {
        Some((addr, prefix)) => {
            let addr: IpAddr = addr
                .parse()
                .map_err(|_| ProxyError::Config(format!("bad ACL address: {:?}", rule)))?;
            let prefix_len: u8 = prefix
                .parse()
                .map_err(|_| ProxyError::Config(format!("bad ACL prefix: {:?}", rule)))?;
            let max = if addr.is_ipv4() { 32 } else { 128 };
            if prefix_len > max {
                return Err(ProxyError::Config(format!("bad ACL prefix: {:?}", rule)));
            }
            (addr, prefix_len)
        }
        None => {
            let addr: IpAddr = target
                .parse()
                .map_err(|_| ProxyError::Config(format!("bad ACL address: {:?}", rule)))?;
            let prefix_len = if addr.is_ipv4() { 32 } else { 128 };
            (addr, prefix_len)
        }
    };

    Ok(AclRule {
        action,
        network: addr,
        prefix_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acl(rules: &[&str]) -> Acl {
        let rules: Vec<String> = rules.iter().map(|s| s.to_string()).collect();
        Acl::parse(&rules).unwrap()
    }

    #[test]
    fn empty_acl_permits_everyone() {
        let acl = Acl::default();
        assert!(acl.permits("10.1.2.3".parse().unwrap()));
        assert!(acl.permits("::1".parse().unwrap()));
    }

    #[test]
    fn first_match_wins() {
        let acl = acl(&["deny 10.0.0.5", "allow 10.0.0.0/8"]);
        assert!(!acl.permits("10.0.0.5".parse().unwrap()));
        assert!(acl.permits("10.9.9.9".parse().unwrap()));
    }

    #[test]
    fn unmatched_client_is_denied_when_rules_exist() {
        let acl = acl(&["allow 127.0.0.1"]);
        assert!(acl.permits("127.0.0.1".parse().unwrap()));
        assert!(!acl.permits("192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn cidr_matching_v4() {
        let acl = acl(&["allow 192.168.0.0/16"]);
        assert!(acl.permits("192.168.44.7".parse().unwrap()));
        assert!(!acl.permits("192.169.0.1".parse().unwrap()));
    }

    #[test]
    fn cidr_matching_v6() {
        let acl = acl(&["allow 2001:db8::/32"]);
        assert!(acl.permits("2001:db8::1".parse().unwrap()));
        assert!(!acl.permits("2001:db9::1".parse().unwrap()));
    }

    #[test]
    fn v4_rules_never_match_v6_clients() {
        let acl = acl(&["allow 0.0.0.0/0"]);
        assert!(!acl.permits("::1".parse().unwrap()));
    }

    #[test]
    fn bad_rules_are_rejected() {
        assert!(Acl::parse(&["permit 1.2.3.4".to_string()]).is_err());
        assert!(Acl::parse(&["allow".to_string()]).is_err());
        assert!(Acl::parse(&["allow 1.2.3.4/40".to_string()]).is_err());
        assert!(Acl::parse(&["allow nonsense".to_string()]).is_err());
    }
}
