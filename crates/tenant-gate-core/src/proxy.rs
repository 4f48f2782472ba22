// crates/tenant-gate-core/src/proxy.rs
// ============================================================================
// Module: Trusted Proxies
// Description: Trusted proxy allow-list with literal and CIDR entries.
// Purpose: Decide whether a physical peer address is a known reverse proxy.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Trusted proxies are parsed once at startup from configuration strings such
//! as `10.0.0.0/8`, `fd00::/8`, or `127.0.0.1`. Membership checks compare
//! whole bytes up to the prefix boundary, then mask the partial byte.
//! Family mismatches are retried after v4-in-v6 unwrapping and otherwise
//! count as "not in network", never as an error.
//!
//! Security posture: this list is the trust boundary for forwarded-address
//! headers. An empty list trusts nobody.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum IPv4 prefix length.
const IPV4_MAX_PREFIX: u8 = 32;
/// Maximum IPv6 prefix length.
const IPV6_MAX_PREFIX: u8 = 128;
/// Prefix length covering the `::ffff:0:0/96` v4-mapped block.
const V4_MAPPED_PREFIX: u8 = 96;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Trusted proxy parse failures.
///
/// # Invariants
/// - Variants are stable for config validation messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProxyParseError {
    /// Entry was empty.
    #[error("trusted proxy entry must be non-empty")]
    Empty,
    /// Address part did not parse.
    #[error("trusted proxy address is invalid: {0}")]
    InvalidAddress(String),
    /// Prefix length did not parse.
    #[error("trusted proxy prefix length is invalid: {0}")]
    InvalidPrefix(String),
    /// Prefix length exceeds the address family width.
    #[error("trusted proxy prefix length {prefix_len} exceeds {max} for {entry}")]
    PrefixTooLong {
        /// Original entry.
        entry: String,
        /// Parsed prefix length.
        prefix_len: u8,
        /// Maximum prefix for the address family.
        max: u8,
    },
}

// ============================================================================
// SECTION: Trusted Proxy Entry
// ============================================================================

/// One trusted proxy allow-list entry.
///
/// # Invariants
/// - `prefix_len` never exceeds the width of `addr`'s family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustedProxy {
    /// Single literal address.
    Literal(IpAddr),
    /// Network in prefix-length notation.
    Network {
        /// Network address.
        addr: IpAddr,
        /// Prefix length in bits.
        prefix_len: u8,
    },
}

impl TrustedProxy {
    /// Parses a literal address or `addr/prefix` network.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyParseError`] when the entry is malformed.
    pub fn parse(entry: &str) -> Result<Self, ProxyParseError> {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            return Err(ProxyParseError::Empty);
        }
        let Some((addr_part, prefix_part)) = trimmed.split_once('/') else {
            let addr = parse_addr(trimmed)?;
            return Ok(Self::Literal(addr));
        };
        let addr = parse_addr(addr_part.trim())?;
        let prefix_len: u8 = prefix_part
            .trim()
            .parse()
            .map_err(|_| ProxyParseError::InvalidPrefix(prefix_part.to_string()))?;
        let max = family_width(addr);
        if prefix_len > max {
            return Err(ProxyParseError::PrefixTooLong {
                entry: trimmed.to_string(),
                prefix_len,
                max,
            });
        }
        Ok(Self::Network {
            addr,
            prefix_len,
        })
    }

    /// Returns true when `candidate` matches this entry.
    #[must_use]
    pub fn contains(&self, candidate: IpAddr) -> bool {
        match *self {
            Self::Literal(addr) => addr.to_canonical() == candidate.to_canonical(),
            Self::Network {
                addr,
                prefix_len,
            } => network_contains(addr, prefix_len, candidate),
        }
    }
}

impl FromStr for TrustedProxy {
    type Err = ProxyParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for TrustedProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(addr) => addr.fmt(f),
            Self::Network {
                addr,
                prefix_len,
            } => write!(f, "{addr}/{prefix_len}"),
        }
    }
}

// ============================================================================
// SECTION: Allow-List
// ============================================================================

/// Parsed trusted proxy allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedProxies {
    /// Parsed entries in configuration order.
    entries: Vec<TrustedProxy>,
}

impl TrustedProxies {
    /// Builds an allow-list from parsed entries.
    #[must_use]
    pub const fn new(entries: Vec<TrustedProxy>) -> Self {
        Self {
            entries,
        }
    }

    /// Parses every configured entry, failing on the first bad one.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyParseError`] for the first malformed entry.
    pub fn parse_all<I, S>(entries: I) -> Result<Self, ProxyParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|entry| TrustedProxy::parse(entry.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(entries))
    }

    /// Returns true when `candidate` matches any entry.
    #[must_use]
    pub fn contains(&self, candidate: IpAddr) -> bool {
        self.entries.iter().any(|entry| entry.contains(candidate))
    }

    /// Returns the parsed entries.
    #[must_use]
    pub fn entries(&self) -> &[TrustedProxy] {
        &self.entries
    }

    /// Returns true when no proxy is trusted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// SECTION: CIDR Matching
// ============================================================================

/// Returns true when `candidate` falls inside `network/prefix_len`.
///
/// Mixed families are compared after unwrapping v4-mapped IPv6 addresses.
#[must_use]
pub fn network_contains(network: IpAddr, prefix_len: u8, candidate: IpAddr) -> bool {
    match (network, candidate) {
        (IpAddr::V4(net), IpAddr::V4(ip)) => prefix_matches(&net.octets(), &ip.octets(), prefix_len),
        (IpAddr::V6(net), IpAddr::V6(ip)) => prefix_matches(&net.octets(), &ip.octets(), prefix_len),
        (IpAddr::V4(net), IpAddr::V6(ip)) => ip
            .to_ipv4_mapped()
            .is_some_and(|ip| prefix_matches(&net.octets(), &ip.octets(), prefix_len)),
        (IpAddr::V6(net), IpAddr::V4(ip)) => {
            net.to_ipv4_mapped().is_some()
                && prefix_len >= V4_MAPPED_PREFIX
                && prefix_matches(&net.octets(), &ip.to_ipv6_mapped().octets(), prefix_len)
        }
    }
}

/// Compares full bytes up to the prefix boundary, then the masked partial byte.
fn prefix_matches(network: &[u8], candidate: &[u8], prefix_len: u8) -> bool {
    if network.len() != candidate.len() {
        return false;
    }
    let full_bytes = usize::from(prefix_len / 8);
    let remaining_bits = prefix_len % 8;
    if full_bytes > network.len() {
        return false;
    }
    if network[.. full_bytes] != candidate[.. full_bytes] {
        return false;
    }
    if remaining_bits == 0 {
        return true;
    }
    let (Some(net_byte), Some(ip_byte)) = (network.get(full_bytes), candidate.get(full_bytes))
    else {
        return false;
    };
    let mask = 0xFF_u8 << (8 - remaining_bits);
    (net_byte & mask) == (ip_byte & mask)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses an address, accepting bracketed IPv6 literals.
fn parse_addr(value: &str) -> Result<IpAddr, ProxyParseError> {
    let unbracketed = value.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')).unwrap_or(value);
    unbracketed.parse().map_err(|_| ProxyParseError::InvalidAddress(value.to_string()))
}

/// Returns the bit width of the address family.
const fn family_width(addr: IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => IPV4_MAX_PREFIX,
        IpAddr::V6(_) => IPV6_MAX_PREFIX,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
