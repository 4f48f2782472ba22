// crates/tenant-gate-core/src/proxy/tests.rs
// ============================================================================
// Module: Trusted Proxy Unit Tests
// Description: Unit tests for trusted proxy parsing and CIDR matching.
// Purpose: Validate prefix boundaries, partial bytes, and family handling.
// Dependencies: tenant-gate-core
// ============================================================================

//! ## Overview
//! Covers literal and network entries, prefix-length edge cases, and
//! v4-in-v6 unwrapping.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_docs_in_private_items,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;

use super::ProxyParseError;
use super::TrustedProxies;
use super::TrustedProxy;
use super::network_contains;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn ip(value: &str) -> IpAddr {
    value.parse().expect("ip literal")
}

fn proxy(value: &str) -> TrustedProxy {
    TrustedProxy::parse(value).expect("proxy entry")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn parses_literal_and_network_entries() {
    assert_eq!(proxy("127.0.0.1"), TrustedProxy::Literal(ip("127.0.0.1")));
    assert_eq!(
        proxy(" 10.0.0.0/8 "),
        TrustedProxy::Network {
            addr: ip("10.0.0.0"),
            prefix_len: 8,
        }
    );
    assert_eq!(
        proxy("[fd00::]/8"),
        TrustedProxy::Network {
            addr: ip("fd00::"),
            prefix_len: 8,
        }
    );
    assert_eq!(proxy("10.0.0.0/8").to_string(), "10.0.0.0/8");
}

#[test]
fn rejects_malformed_entries() {
    assert_eq!(TrustedProxy::parse("  "), Err(ProxyParseError::Empty));
    assert!(matches!(TrustedProxy::parse("10.0.0/8"), Err(ProxyParseError::InvalidAddress(_))));
    assert!(matches!(TrustedProxy::parse("10.0.0.0/x"), Err(ProxyParseError::InvalidPrefix(_))));
    assert!(matches!(TrustedProxy::parse("10.0.0.0/-1"), Err(ProxyParseError::InvalidPrefix(_))));
    assert!(matches!(
        TrustedProxy::parse("10.0.0.0/33"),
        Err(ProxyParseError::PrefixTooLong {
            max: 32,
            ..
        })
    ));
    assert!(matches!(
        TrustedProxy::parse("::/129"),
        Err(ProxyParseError::PrefixTooLong {
            max: 128,
            ..
        })
    ));
}

#[test]
fn zero_prefix_matches_every_address_of_the_family() {
    let any = proxy("0.0.0.0/0");
    assert!(any.contains(ip("203.0.113.9")));
    assert!(any.contains(ip("255.255.255.255")));
    assert!(proxy("::/0").contains(ip("2001:db8::1")));
}

#[test]
fn full_prefix_matches_only_the_exact_address() {
    let exact = proxy("192.0.2.10/32");
    assert!(exact.contains(ip("192.0.2.10")));
    assert!(!exact.contains(ip("192.0.2.11")));
    assert!(proxy("2001:db8::1/128").contains(ip("2001:db8::1")));
    assert!(!proxy("2001:db8::1/128").contains(ip("2001:db8::2")));
}

#[test]
fn partial_byte_prefixes_mask_correctly() {
    let network = proxy("172.16.0.0/12");
    assert!(network.contains(ip("172.16.0.1")));
    assert!(network.contains(ip("172.31.255.254")));
    assert!(!network.contains(ip("172.32.0.1")));
    assert!(!network.contains(ip("172.15.255.255")));

    let v6 = proxy("fe80::/10");
    assert!(v6.contains(ip("fe80::1")));
    assert!(v6.contains(ip("febf::1")));
    assert!(!v6.contains(ip("fec0::1")));
}

#[test]
fn host_bits_in_network_address_are_ignored() {
    assert!(proxy("10.1.2.3/8").contains(ip("10.200.0.1")));
}

#[test]
fn v4_mapped_candidates_match_v4_networks() {
    assert!(proxy("10.0.0.0/8").contains(ip("::ffff:10.0.0.4")));
    assert!(proxy("10.0.0.4").contains(ip("::ffff:10.0.0.4")));
    assert!(!proxy("10.0.0.0/8").contains(ip("::ffff:11.0.0.4")));
}

#[test]
fn v4_candidates_match_v4_mapped_networks() {
    assert!(proxy("::ffff:10.0.0.0/104").contains(ip("10.9.8.7")));
    assert!(!proxy("::ffff:10.0.0.0/104").contains(ip("11.9.8.7")));
}

#[test]
fn family_mismatch_is_not_in_network() {
    assert!(!proxy("10.0.0.0/8").contains(ip("2001:db8::1")));
    assert!(!proxy("2001:db8::/32").contains(ip("10.0.0.1")));
    assert!(!network_contains(ip("::"), 0, ip("10.0.0.1")));
}

#[test]
fn allow_list_matches_any_entry() {
    let proxies = TrustedProxies::parse_all(["10.0.0.0/8", "127.0.0.1"]).expect("proxies");
    assert!(proxies.contains(ip("10.0.0.4")));
    assert!(proxies.contains(ip("127.0.0.1")));
    assert!(!proxies.contains(ip("127.0.0.2")));
    assert_eq!(proxies.entries().len(), 2);

    let empty = TrustedProxies::default();
    assert!(empty.is_empty());
    assert!(!empty.contains(ip("127.0.0.1")));
}

#[test]
fn allow_list_parse_fails_on_first_bad_entry() {
    let result = TrustedProxies::parse_all(["10.0.0.0/8", "bogus"]);
    assert!(matches!(result, Err(ProxyParseError::InvalidAddress(value)) if value == "bogus"));
}
