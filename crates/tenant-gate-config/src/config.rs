// crates/tenant-gate-config/src/config.rs
// ============================================================================
// Module: Tenant Gate Configuration
// Description: Configuration loading and validation for Tenant Gate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: tenant-gate-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing sections take defaults; present but invalid values fail closed.
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tenant_gate_core::DEFAULT_FORWARDED_HEADER;
use tenant_gate_core::DEFAULT_TENANT_HEADER;
use tenant_gate_core::DirectoryCacheConfig;
use tenant_gate_core::PipelineSettings;
use tenant_gate_core::TenantId;
use tenant_gate_core::TrustedProxies;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "tenant-gate.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "TENANT_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default tenant when none is configured.
pub(crate) const DEFAULT_DEFAULT_TENANT_ID: u64 = 1;
/// Maximum header name length.
pub(crate) const MAX_HEADER_NAME_LENGTH: usize = 128;
/// Minimum tenant cache TTL in milliseconds.
pub(crate) const MIN_TENANT_CACHE_TTL_MS: u64 = 1_000;
/// Maximum tenant cache TTL in milliseconds (24 hours).
pub(crate) const MAX_TENANT_CACHE_TTL_MS: u64 = 86_400_000;
/// Default tenant cache TTL in milliseconds (15 minutes).
pub(crate) const DEFAULT_TENANT_CACHE_TTL_MS: u64 = 900_000;
/// Maximum tenant cache entries.
pub(crate) const MAX_TENANT_CACHE_ENTRIES: usize = 65_536;
/// Default tenant cache entries.
pub(crate) const DEFAULT_TENANT_CACHE_MAX_ENTRIES: usize = 4_096;
/// Minimum resolution deadline in milliseconds.
pub(crate) const MIN_RESOLUTION_TIMEOUT_MS: u64 = 50;
/// Maximum resolution deadline in milliseconds.
pub(crate) const MAX_RESOLUTION_TIMEOUT_MS: u64 = 30_000;
/// Default resolution deadline in milliseconds.
pub(crate) const DEFAULT_RESOLUTION_TIMEOUT_MS: u64 = 2_000;
/// Maximum trusted proxy entries.
pub(crate) const MAX_TRUSTED_PROXIES: usize = 256;
/// Minimum allowed rate limit window in milliseconds.
pub(crate) const MIN_RATE_LIMIT_WINDOW_MS: u64 = 100;
/// Maximum allowed rate limit window in milliseconds.
pub(crate) const MAX_RATE_LIMIT_WINDOW_MS: u64 = 60_000;
/// Maximum allowed requests per rate limit window.
pub(crate) const MAX_RATE_LIMIT_REQUESTS: u32 = 100_000;
/// Maximum number of tracked rate limit entries.
pub(crate) const MAX_RATE_LIMIT_ENTRIES: usize = 65_536;
/// Default max requests per window when rate limiting is enabled.
pub(crate) const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 1_000;
/// Default rate limit window in milliseconds when enabled.
pub(crate) const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 1_000;
/// Default max tracked rate limit entries when enabled.
pub(crate) const DEFAULT_RATE_LIMIT_MAX_ENTRIES: usize = 4_096;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Tenant Gate configuration root.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantGateConfig {
    /// Tenant resolution configuration.
    #[serde(default)]
    pub tenancy: TenancyConfig,
    /// Trust-boundary configuration.
    #[serde(default)]
    pub trust: TrustConfig,
    /// Abuse-control limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Audit output configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl TenantGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tenancy.validate()?;
        self.trust.validate()?;
        self.limits.validate()?;
        self.audit.validate()?;
        Ok(())
    }

    /// Builds pipeline settings from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn pipeline_settings(&self) -> Result<PipelineSettings, ConfigError> {
        self.validate()?;
        Ok(PipelineSettings {
            default_tenant_id: self.tenancy.default_tenant()?,
            tenant_header_name: self.tenancy.tenant_header_name.trim().to_string(),
            forwarded_header_name: self.tenancy.forwarded_header_name.trim().to_string(),
            trusted_proxies: self.trust.trusted_proxies()?,
            resolution_timeout: self.tenancy.resolution_timeout(),
        })
    }
}

// ============================================================================
// SECTION: Tenancy
// ============================================================================

/// Tenant resolution configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TenancyConfig {
    /// Tenant used when a request carries no tenant signal.
    #[serde(default = "default_default_tenant_id")]
    pub default_tenant_id: u64,
    /// Explicit tenant header name.
    #[serde(default = "default_tenant_header_name")]
    pub tenant_header_name: String,
    /// Forwarded client address header name.
    #[serde(default = "default_forwarded_header_name")]
    pub forwarded_header_name: String,
    /// Tenant directory cache entry lifetime in milliseconds.
    #[serde(default = "default_tenant_cache_ttl_ms")]
    pub tenant_cache_ttl_ms: u64,
    /// Maximum tenant directory cache entries.
    #[serde(default = "default_tenant_cache_max_entries")]
    pub tenant_cache_max_entries: usize,
    /// Deadline for a resolution pass in milliseconds.
    #[serde(default = "default_resolution_timeout_ms")]
    pub resolution_timeout_ms: u64,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            default_tenant_id: DEFAULT_DEFAULT_TENANT_ID,
            tenant_header_name: default_tenant_header_name(),
            forwarded_header_name: default_forwarded_header_name(),
            tenant_cache_ttl_ms: DEFAULT_TENANT_CACHE_TTL_MS,
            tenant_cache_max_entries: DEFAULT_TENANT_CACHE_MAX_ENTRIES,
            resolution_timeout_ms: DEFAULT_RESOLUTION_TIMEOUT_MS,
        }
    }
}

impl TenancyConfig {
    /// Validates tenancy settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.default_tenant()?;
        validate_header_name("tenancy.tenant_header_name", &self.tenant_header_name)?;
        validate_header_name("tenancy.forwarded_header_name", &self.forwarded_header_name)?;
        if self.tenant_header_name.trim().eq_ignore_ascii_case(self.forwarded_header_name.trim()) {
            return Err(ConfigError::Invalid(
                "tenancy.tenant_header_name must differ from forwarded_header_name".to_string(),
            ));
        }
        if self.tenant_cache_ttl_ms < MIN_TENANT_CACHE_TTL_MS
            || self.tenant_cache_ttl_ms > MAX_TENANT_CACHE_TTL_MS
        {
            return Err(ConfigError::Invalid(format!(
                "tenancy.tenant_cache_ttl_ms must be between {MIN_TENANT_CACHE_TTL_MS} and \
                 {MAX_TENANT_CACHE_TTL_MS}",
            )));
        }
        if self.tenant_cache_max_entries == 0 {
            return Err(ConfigError::Invalid(
                "tenancy.tenant_cache_max_entries must be greater than zero".to_string(),
            ));
        }
        if self.tenant_cache_max_entries > MAX_TENANT_CACHE_ENTRIES {
            return Err(ConfigError::Invalid(
                "tenancy.tenant_cache_max_entries too large".to_string(),
            ));
        }
        if self.resolution_timeout_ms < MIN_RESOLUTION_TIMEOUT_MS
            || self.resolution_timeout_ms > MAX_RESOLUTION_TIMEOUT_MS
        {
            return Err(ConfigError::Invalid(format!(
                "tenancy.resolution_timeout_ms must be between {MIN_RESOLUTION_TIMEOUT_MS} and \
                 {MAX_RESOLUTION_TIMEOUT_MS}",
            )));
        }
        Ok(())
    }

    /// Returns the configured default tenant.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the id is zero.
    pub fn default_tenant(&self) -> Result<TenantId, ConfigError> {
        TenantId::from_raw(self.default_tenant_id).ok_or_else(|| {
            ConfigError::Invalid("tenancy.default_tenant_id must be >= 1".to_string())
        })
    }

    /// Returns the directory cache settings.
    #[must_use]
    pub const fn cache_config(&self) -> DirectoryCacheConfig {
        DirectoryCacheConfig {
            ttl: Duration::from_millis(self.tenant_cache_ttl_ms),
            max_entries: self.tenant_cache_max_entries,
        }
    }

    /// Returns the resolution deadline.
    #[must_use]
    pub const fn resolution_timeout(&self) -> Duration {
        Duration::from_millis(self.resolution_timeout_ms)
    }
}

// ============================================================================
// SECTION: Trust
// ============================================================================

/// Trust-boundary configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrustConfig {
    /// Trusted reverse proxies (literal addresses or CIDR networks).
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

impl TrustConfig {
    /// Validates trust settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.trusted_proxies.len() > MAX_TRUSTED_PROXIES {
            return Err(ConfigError::Invalid(format!(
                "trust.trusted_proxies exceeds max entries ({MAX_TRUSTED_PROXIES})"
            )));
        }
        self.trusted_proxies()?;
        Ok(())
    }

    /// Parses the trusted proxy allow-list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an entry does not parse.
    pub fn trusted_proxies(&self) -> Result<TrustedProxies, ConfigError> {
        TrustedProxies::parse_all(&self.trusted_proxies)
            .map_err(|err| ConfigError::Invalid(format!("trust.trusted_proxies: {err}")))
    }
}

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Abuse-control limits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsConfig {
    /// Optional per-client rate limit.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

impl LimitsConfig {
    /// Validates limit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(rate_limit) = &self.rate_limit {
            rate_limit.validate()?;
        }
        Ok(())
    }
}

/// Rate limit configuration keyed by client identity.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per time window.
    #[serde(default = "default_rate_limit_max_requests")]
    pub max_requests: u32,
    /// Window duration in milliseconds.
    #[serde(default = "default_rate_limit_window_ms")]
    pub window_ms: u64,
    /// Maximum number of distinct rate limit entries.
    #[serde(default = "default_rate_limit_max_entries")]
    pub max_entries: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            window_ms: DEFAULT_RATE_LIMIT_WINDOW_MS,
            max_entries: DEFAULT_RATE_LIMIT_MAX_ENTRIES,
        }
    }
}

impl RateLimitConfig {
    /// Validates rate limit settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit max_requests must be greater than zero".to_string(),
            ));
        }
        if self.max_requests > MAX_RATE_LIMIT_REQUESTS {
            return Err(ConfigError::Invalid("rate_limit max_requests too large".to_string()));
        }
        if self.window_ms < MIN_RATE_LIMIT_WINDOW_MS || self.window_ms > MAX_RATE_LIMIT_WINDOW_MS {
            return Err(ConfigError::Invalid(format!(
                "rate_limit window_ms must be between {MIN_RATE_LIMIT_WINDOW_MS} and \
                 {MAX_RATE_LIMIT_WINDOW_MS}",
            )));
        }
        if self.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit max_entries must be greater than zero".to_string(),
            ));
        }
        if self.max_entries > MAX_RATE_LIMIT_ENTRIES {
            return Err(ConfigError::Invalid("rate_limit max_entries too large".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Audit disabled.
    None,
}

/// Audit output configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditConfig {
    /// Sink selection.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Audit log path (file sink only).
    #[serde(default)]
    pub path: Option<String>,
}

impl AuditConfig {
    /// Validates audit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, self.path.as_deref()) {
            (AuditSinkKind::File, Some(path)) => validate_path_string("audit.path", path),
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("audit.path is required for file sink".to_string()))
            }
            (_, Some(_)) => {
                Err(ConfigError::Invalid("audit.path is only valid for file sink".to_string()))
            }
            (_, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from an explicit path or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates an HTTP header name (RFC 9110 token characters).
fn validate_header_name(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_HEADER_NAME_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    if !trimmed.bytes().all(is_header_token_byte) {
        return Err(ConfigError::Invalid(format!("{field} is not a valid header name")));
    }
    Ok(())
}

/// Returns true for bytes allowed in an HTTP token.
const fn is_header_token_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

/// Default tenant id.
const fn default_default_tenant_id() -> u64 {
    DEFAULT_DEFAULT_TENANT_ID
}

/// Default tenant header name.
fn default_tenant_header_name() -> String {
    DEFAULT_TENANT_HEADER.to_string()
}

/// Default forwarded header name.
fn default_forwarded_header_name() -> String {
    DEFAULT_FORWARDED_HEADER.to_string()
}

/// Default tenant cache TTL.
const fn default_tenant_cache_ttl_ms() -> u64 {
    DEFAULT_TENANT_CACHE_TTL_MS
}

/// Default tenant cache bound.
const fn default_tenant_cache_max_entries() -> usize {
    DEFAULT_TENANT_CACHE_MAX_ENTRIES
}

/// Default resolution deadline.
const fn default_resolution_timeout_ms() -> u64 {
    DEFAULT_RESOLUTION_TIMEOUT_MS
}

/// Default max requests per rate limit window.
pub(crate) const fn default_rate_limit_max_requests() -> u32 {
    DEFAULT_RATE_LIMIT_MAX_REQUESTS
}

/// Default rate limit window in milliseconds.
pub(crate) const fn default_rate_limit_window_ms() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_MS
}

/// Default max entries for rate limiting.
pub(crate) const fn default_rate_limit_max_entries() -> usize {
    DEFAULT_RATE_LIMIT_MAX_ENTRIES
}

// ============================================================================
// SECTION: Tests
// ============================================================================
