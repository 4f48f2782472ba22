// crates/tenant-gate-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration for Tenant Gate.
// Purpose: Ship a documented tenant-gate.toml that always validates.
// Dependencies: none
// ============================================================================

//! ## Overview
//! The example is kept in sync with the config model by the artifact tests.

/// Returns a documented example `tenant-gate.toml`.
#[must_use]
pub fn config_toml_example() -> String {
    r#"# tenant-gate.toml

[tenancy]
# Tenant used when a request carries no tenant signal.
default_tenant_id = 1
tenant_header_name = "X-Tenant-ID"
forwarded_header_name = "X-Forwarded-For"
# Directory cache: 15 minute entries, bounded size.
tenant_cache_ttl_ms = 900000
tenant_cache_max_entries = 4096
# Resolution deadline; expiry rejects the request.
resolution_timeout_ms = 2000

[trust]
# Only these peers may set the forwarded header.
trusted_proxies = ["10.0.0.0/8", "172.16.0.0/12", "::1"]

[limits.rate_limit]
max_requests = 1000
window_ms = 1000
max_entries = 4096

[audit]
sink = "stderr"
"#
    .to_string()
}
