// # Address Matcher
//
// Parses rule entries as a bare address or a CIDR block and tests whether
// an incoming source address falls inside them.
//
// Cross-family comparisons (IPv4 address against an IPv6 entry and vice
// versa) never match and never error. A malformed *source* address is an
// error of its own (`InvalidAddress`) so that the caller denies at a
// higher layer instead of the matcher silently classifying it.

use crate::error::{Error, Result};
use ipnet::IpNet;
use std::net::IpAddr;

/// A parsed rule entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressPattern {
    /// A single address, matched by equality
    Exact(IpAddr),
    /// A CIDR block, matched by prefix containment
    Network(IpNet),
}

impl AddressPattern {
    /// Parse a rule entry
    ///
    /// Accepts `192.168.1.10`, `192.168.1.0/24`, `2001:db8::1` and
    /// `2001:db8::/32`. Host bits set in a CIDR entry are ignored.
    pub fn parse(entry: &str) -> Result<Self> {
        let entry = entry.trim();
        if entry.contains('/') {
            let net: IpNet = entry.parse().map_err(|_| {
                Error::validation("entry", format!("'{}' is not a valid CIDR block", entry))
            })?;
            return Ok(AddressPattern::Network(net.trunc()));
        }

        entry
            .parse::<IpAddr>()
            .map(AddressPattern::Exact)
            .map_err(|_| Error::validation("entry", format!("'{}' is not a valid IP address", entry)))
    }

    /// Check whether `address` falls inside this pattern
    pub fn contains(&self, address: &IpAddr) -> bool {
        match self {
            AddressPattern::Exact(ip) => ip == address,
            // IpNet::contains already returns false across families
            AddressPattern::Network(net) => net.contains(address),
        }
    }
}

impl std::fmt::Display for AddressPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressPattern::Exact(ip) => write!(f, "{}", ip),
            AddressPattern::Network(net) => write!(f, "{}", net),
        }
    }
}

/// Parse an incoming source address
pub fn parse_source(address: &str) -> Result<IpAddr> {
    address
        .trim()
        .parse()
        .map_err(|_| Error::InvalidAddress(address.to_string()))
}

/// Test a source address against a single rule entry
pub fn matches(address: &str, rule_entry: &str) -> Result<bool> {
    let source = parse_source(address)?;
    let pattern = AddressPattern::parse(rule_entry)?;
    Ok(pattern.contains(&source))
}
