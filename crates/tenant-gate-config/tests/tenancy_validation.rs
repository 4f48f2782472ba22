//! Tenancy, limits, and audit validation tests for tenant-gate-config.
// crates/tenant-gate-config/tests/tenancy_validation.rs
// =============================================================================
// Module: Tenancy Validation Tests
// Description: Validate tenancy ranges, header names, limits, and audit sinks.
// Purpose: Ensure out-of-range values fail closed with clear messages.
// =============================================================================

mod common;

use std::time::Duration;

use common::TestResult;
use common::assert_invalid;
use common::config_from_toml;
use common::minimal_config;
use tenant_gate_config::AuditSinkKind;
use tenant_gate_config::RateLimitConfig;

#[test]
fn defaults_validate_and_match_pipeline_defaults() -> TestResult {
    let config = minimal_config();
    config.validate().map_err(|err| err.to_string())?;
    let settings = config.pipeline_settings().map_err(|err| err.to_string())?;
    if settings.default_tenant_id.get() != 1 {
        return Err("default tenant mismatch".to_string());
    }
    if settings.tenant_header_name != "X-Tenant-ID" {
        return Err("tenant header mismatch".to_string());
    }
    if settings.forwarded_header_name != "X-Forwarded-For" {
        return Err("forwarded header mismatch".to_string());
    }
    if settings.resolution_timeout != Duration::from_secs(2) {
        return Err("resolution timeout mismatch".to_string());
    }
    if !settings.trusted_proxies.is_empty() {
        return Err("no proxies should be trusted by default".to_string());
    }
    let cache = config.tenancy.cache_config();
    if cache.ttl != Duration::from_secs(900) || cache.max_entries != 4_096 {
        return Err("cache defaults mismatch".to_string());
    }
    if config.audit.sink != AuditSinkKind::Stderr {
        return Err("audit should default to stderr".to_string());
    }
    Ok(())
}

#[test]
fn default_tenant_zero_rejected() -> TestResult {
    let config = config_from_toml("[tenancy]\ndefault_tenant_id = 0\n")?;
    assert_invalid(config.validate(), "tenancy.default_tenant_id must be >= 1")?;
    assert_invalid(config.pipeline_settings(), "tenancy.default_tenant_id must be >= 1")?;
    Ok(())
}

#[test]
fn header_names_must_be_tokens() -> TestResult {
    let config = config_from_toml("[tenancy]\ntenant_header_name = \"X Tenant\"\n")?;
    assert_invalid(config.validate(), "tenancy.tenant_header_name is not a valid header name")?;
    let config = config_from_toml("[tenancy]\nforwarded_header_name = \"\"\n")?;
    assert_invalid(config.validate(), "tenancy.forwarded_header_name must be non-empty")?;
    Ok(())
}

#[test]
fn header_names_must_differ() -> TestResult {
    let config = config_from_toml(
        "[tenancy]\ntenant_header_name = \"x-forwarded-for\"\nforwarded_header_name = \
         \"X-Forwarded-For\"\n",
    )?;
    assert_invalid(config.validate(), "must differ from forwarded_header_name")?;
    Ok(())
}

#[test]
fn custom_header_names_flow_into_settings() -> TestResult {
    let config = config_from_toml(
        "[tenancy]\ntenant_header_name = \" X-Org \"\nforwarded_header_name = \"X-Real-IP\"\n",
    )?;
    let settings = config.pipeline_settings().map_err(|err| err.to_string())?;
    if settings.tenant_header_name != "X-Org" || settings.forwarded_header_name != "X-Real-IP" {
        return Err("custom header names not applied".to_string());
    }
    Ok(())
}

#[test]
fn cache_ttl_bounds_enforced() -> TestResult {
    let config = config_from_toml("[tenancy]\ntenant_cache_ttl_ms = 999\n")?;
    assert_invalid(config.validate(), "tenancy.tenant_cache_ttl_ms must be between")?;
    let config = config_from_toml("[tenancy]\ntenant_cache_ttl_ms = 86400001\n")?;
    assert_invalid(config.validate(), "tenancy.tenant_cache_ttl_ms must be between")?;
    let config = config_from_toml("[tenancy]\ntenant_cache_ttl_ms = 1000\n")?;
    config.validate().map_err(|err| err.to_string())?;
    Ok(())
}

#[test]
fn cache_entry_bounds_enforced() -> TestResult {
    let config = config_from_toml("[tenancy]\ntenant_cache_max_entries = 0\n")?;
    assert_invalid(config.validate(), "tenancy.tenant_cache_max_entries must be greater than zero")?;
    let config = config_from_toml("[tenancy]\ntenant_cache_max_entries = 65537\n")?;
    assert_invalid(config.validate(), "tenancy.tenant_cache_max_entries too large")?;
    Ok(())
}

#[test]
fn resolution_timeout_bounds_enforced() -> TestResult {
    let config = config_from_toml("[tenancy]\nresolution_timeout_ms = 49\n")?;
    assert_invalid(config.validate(), "tenancy.resolution_timeout_ms must be between")?;
    let config = config_from_toml("[tenancy]\nresolution_timeout_ms = 30001\n")?;
    assert_invalid(config.validate(), "tenancy.resolution_timeout_ms must be between")?;
    let config = config_from_toml("[tenancy]\nresolution_timeout_ms = 250\n")?;
    if config.tenancy.resolution_timeout() != Duration::from_millis(250) {
        return Err("resolution timeout not applied".to_string());
    }
    Ok(())
}

#[test]
fn rate_limit_defaults_apply_to_empty_table() -> TestResult {
    let config = config_from_toml("[limits.rate_limit]\n")?;
    config.validate().map_err(|err| err.to_string())?;
    let rate_limit = config.limits.rate_limit.ok_or("rate limit missing")?;
    let defaults = RateLimitConfig::default();
    if rate_limit.max_requests != defaults.max_requests
        || rate_limit.window_ms != defaults.window_ms
        || rate_limit.max_entries != defaults.max_entries
    {
        return Err("rate limit defaults mismatch".to_string());
    }
    Ok(())
}

#[test]
fn rate_limit_bounds_enforced() -> TestResult {
    let cases = [
        ("max_requests = 0", "rate_limit max_requests must be greater than zero"),
        ("max_requests = 100001", "rate_limit max_requests too large"),
        ("window_ms = 99", "rate_limit window_ms must be between"),
        ("window_ms = 60001", "rate_limit window_ms must be between"),
        ("max_entries = 0", "rate_limit max_entries must be greater than zero"),
        ("max_entries = 65537", "rate_limit max_entries too large"),
    ];
    for (line, needle) in cases {
        let config = config_from_toml(&format!("[limits.rate_limit]\n{line}\n"))?;
        assert_invalid(config.validate(), needle)?;
    }
    Ok(())
}

#[test]
fn file_audit_sink_requires_path() -> TestResult {
    let config = config_from_toml("[audit]\nsink = \"file\"\n")?;
    assert_invalid(config.validate(), "audit.path is required for file sink")?;
    let config = config_from_toml("[audit]\nsink = \"file\"\npath = \"   \"\n")?;
    assert_invalid(config.validate(), "audit.path must be non-empty")?;
    let config = config_from_toml("[audit]\nsink = \"file\"\npath = \"/var/log/tenancy.jsonl\"\n")?;
    config.validate().map_err(|err| err.to_string())?;
    Ok(())
}

#[test]
fn audit_path_rejected_for_other_sinks() -> TestResult {
    let config = config_from_toml("[audit]\nsink = \"none\"\npath = \"audit.jsonl\"\n")?;
    assert_invalid(config.validate(), "audit.path is only valid for file sink")?;
    Ok(())
}

#[test]
fn unknown_audit_sink_fails_to_parse() -> TestResult {
    if config_from_toml("[audit]\nsink = \"syslog\"\n").is_ok() {
        return Err("unknown sink should not parse".to_string());
    }
    Ok(())
}
