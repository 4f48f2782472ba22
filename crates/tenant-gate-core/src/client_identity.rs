// crates/tenant-gate-core/src/client_identity.rs
// ============================================================================
// Module: Client Identity
// Description: Trust-boundary client identifier for abuse-control keys.
// Purpose: Derive a partition key from the peer address and forwarded header.
// Dependencies: serde, tracing
// ============================================================================

//! ## Overview
//! [`ClientIdentifier`] returns the key used to partition abuse-control
//! decisions. The forwarded-address header is honored only when the direct
//! peer is a configured trusted proxy; otherwise it is ignored.
//!
//! Security posture: forwarded headers are client-controlled input. Anything
//! that fails to parse falls back to the physical peer address.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;
use std::net::SocketAddr;

use serde::Serialize;
use tracing::debug;

use crate::proxy::TrustedProxies;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Where a client identity key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// Physical connection address.
    Physical,
    /// First entry of a forwarded-address header sent by a trusted proxy.
    Forwarded,
}

/// Derived client identity used for abuse-control partitioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Canonical address string used as the partition key.
    pub key: String,
    /// Address the key was derived from.
    pub addr: IpAddr,
    /// Source of the key.
    pub source: IdentitySource,
}

impl ClientIdentity {
    /// Builds an identity from an address, canonicalizing v4-mapped forms.
    fn from_addr(addr: IpAddr, source: IdentitySource) -> Self {
        let addr = addr.to_canonical();
        Self {
            key: addr.to_string(),
            addr,
            source,
        }
    }
}

// ============================================================================
// SECTION: Identifier
// ============================================================================

/// Trust-boundary client identifier.
#[derive(Debug, Clone, Default)]
pub struct ClientIdentifier {
    /// Configured trusted proxies.
    proxies: TrustedProxies,
}

impl ClientIdentifier {
    /// Creates an identifier trusting the given proxies.
    #[must_use]
    pub const fn new(proxies: TrustedProxies) -> Self {
        Self {
            proxies,
        }
    }

    /// Returns the trusted proxy allow-list.
    #[must_use]
    pub const fn proxies(&self) -> &TrustedProxies {
        &self.proxies
    }

    /// Derives the client identity for a connection.
    #[must_use]
    pub fn identify(&self, physical: IpAddr, forwarded: Option<&str>) -> ClientIdentity {
        let Some(header) = forwarded else {
            return ClientIdentity::from_addr(physical, IdentitySource::Physical);
        };
        if !self.proxies.contains(physical) {
            debug!(peer = %physical, "ignoring forwarded address from untrusted peer");
            return ClientIdentity::from_addr(physical, IdentitySource::Physical);
        }
        match parse_first_forwarded(header) {
            Some(origin) => ClientIdentity::from_addr(origin, IdentitySource::Forwarded),
            None => {
                debug!(peer = %physical, "unparseable forwarded address from trusted proxy");
                ClientIdentity::from_addr(physical, IdentitySource::Physical)
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses the originating client (first entry) of a forwarded-address header.
fn parse_first_forwarded(header: &str) -> Option<IpAddr> {
    let first = header.split(',').next()?.trim();
    if first.is_empty() {
        return None;
    }
    if let Ok(addr) = first.parse::<IpAddr>() {
        return Some(addr);
    }
    if let Ok(socket) = first.parse::<SocketAddr>() {
        return Some(socket.ip());
    }
    first.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')).and_then(|v6| v6.parse().ok())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test-only assertions use expect for clarity.")]

    use std::net::IpAddr;

    use super::ClientIdentifier;
    use super::IdentitySource;
    use crate::proxy::TrustedProxies;

    fn identifier() -> ClientIdentifier {
        ClientIdentifier::new(
            TrustedProxies::parse_all(["10.0.0.0/8", "::1"]).expect("proxies"),
        )
    }

    fn ip(value: &str) -> IpAddr {
        value.parse().expect("ip literal")
    }

    #[test]
    fn trusted_proxy_uses_first_forwarded_entry() {
        let identity = identifier().identify(ip("10.0.0.4"), Some("203.0.113.7, 10.0.0.4"));
        assert_eq!(identity.key, "203.0.113.7");
        assert_eq!(identity.source, IdentitySource::Forwarded);
    }

    #[test]
    fn untrusted_peer_ignores_header() {
        let identity = identifier().identify(ip("203.0.113.9"), Some("203.0.113.7, 10.0.0.4"));
        assert_eq!(identity.key, "203.0.113.9");
        assert_eq!(identity.source, IdentitySource::Physical);
    }

    #[test]
    fn missing_empty_or_malformed_header_falls_back() {
        let identifier = identifier();
        for header in [None, Some(""), Some("  , 1.2.3.4"), Some("unknown"), Some("999.1.1.1")] {
            let identity = identifier.identify(ip("10.1.1.1"), header);
            assert_eq!(identity.key, "10.1.1.1");
            assert_eq!(identity.source, IdentitySource::Physical);
        }
    }

    #[test]
    fn accepts_socket_and_bracketed_forms() {
        let identifier = identifier();
        assert_eq!(identifier.identify(ip("::1"), Some("198.51.100.2:4431")).key, "198.51.100.2");
        assert_eq!(identifier.identify(ip("::1"), Some("[2001:db8::7]:443")).key, "2001:db8::7");
        assert_eq!(identifier.identify(ip("::1"), Some("[2001:db8::8]")).key, "2001:db8::8");
    }

    #[test]
    fn v4_mapped_peers_are_canonicalized() {
        let identity = identifier().identify(ip("::ffff:10.0.0.9"), Some("203.0.113.1"));
        assert_eq!(identity.key, "203.0.113.1");
        let physical = ClientIdentifier::default().identify(ip("::ffff:192.0.2.1"), None);
        assert_eq!(physical.key, "192.0.2.1");
    }
}
