// crates/tenant-gate-config/tests/common/mod.rs
// ============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Build configs from TOML snippets and check error messages.
// Dependencies: tenant-gate-config, toml
// ============================================================================

#![allow(dead_code, reason = "Each test binary uses a subset of the helpers.")]

use tenant_gate_config::ConfigError;
use tenant_gate_config::TenantGateConfig;

pub type TestResult = Result<(), String>;

/// Parses a config from TOML without validating it.
pub fn config_from_toml(toml_text: &str) -> Result<TenantGateConfig, String> {
    toml::from_str(toml_text).map_err(|err| err.to_string())
}

/// Returns the all-defaults config.
pub fn minimal_config() -> TenantGateConfig {
    TenantGateConfig::default()
}

/// Asserts that a result is an error whose message contains `needle`.
pub fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}
