// crates/tenant-gate-core/src/core/tenant.rs
// ============================================================================
// Module: Tenant Records
// Description: Tenant directory records, settings, feature sets, and identity.
// Purpose: Define the data consumed by resolution and the tenant context.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! These types describe what the tenant directory returns and what identity
//! verification hands in. They are read-only from this crate's perspective:
//! tenants are provisioned elsewhere and claims are verified upstream.
//!
//! Security posture: stored feature data is untrusted and must never fail a
//! request; see [`FeatureSet::parse_blob`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::identifiers::TenantId;
use crate::core::identifiers::TenantSlug;

// ============================================================================
// SECTION: Tenant Record
// ============================================================================

/// Tenant record as stored in the directory.
///
/// # Invariants
/// - `slug` and `domain` are unique across tenants.
/// - `domain`, when present, is stored in normalized form (see [`normalize_host`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    /// Tenant identifier.
    pub id: TenantId,
    /// Unique tenant slug.
    pub slug: TenantSlug,
    /// Optional bound domain.
    pub domain: Option<String>,
    /// Whether the tenant may serve requests.
    pub active: bool,
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Key/value settings scoped to one tenant.
///
/// Values are stored as strings and typed at read time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantSettings(BTreeMap<String, String>);

impl TenantSettings {
    /// Builds settings from a key/value map.
    #[must_use]
    pub const fn new(values: BTreeMap<String, String>) -> Self {
        Self(values)
    }

    /// Returns the raw value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Parses the value for `key` into `T`.
    ///
    /// Returns `None` when the key is missing or the value does not parse.
    #[must_use]
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|value| value.trim().parse().ok())
    }

    /// Reads a boolean setting (`true`/`false`/`1`/`0`/`yes`/`no`/`on`/`off`).
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)?.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    /// Returns the number of settings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no settings are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for TenantSettings {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// SECTION: Feature Set
// ============================================================================

/// Enabled feature flags for one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet(BTreeSet<String>);

/// Reasons a stored feature blob was rejected.
///
/// # Invariants
/// - Rejection never propagates past [`FeatureSet::parse_blob`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedFeatureData {
    /// Blob was not valid JSON.
    #[error("feature blob is not valid json: {0}")]
    InvalidJson(String),
    /// Blob was JSON but not an array or object.
    #[error("feature blob must be a json array or object")]
    UnsupportedShape,
    /// Array item was not a string.
    #[error("feature blob array items must be strings")]
    NonStringItem,
    /// Object value was not a boolean.
    #[error("feature blob object values must be booleans")]
    NonBooleanValue,
}

impl FeatureSet {
    /// Returns an empty feature set.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses a stored feature blob, degrading to the empty set on failure.
    ///
    /// Accepts a JSON array of flag names or a JSON object of `name -> bool`
    /// where `true` enables the flag.
    #[must_use]
    pub fn parse_blob(blob: &str) -> (Self, Option<MalformedFeatureData>) {
        match Self::try_parse_blob(blob) {
            Ok(features) => (features, None),
            Err(error) => (Self::empty(), Some(error)),
        }
    }

    /// Strictly parses a stored feature blob.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedFeatureData`] when the blob does not match an
    /// accepted shape.
    pub fn try_parse_blob(blob: &str) -> Result<Self, MalformedFeatureData> {
        let value: Value = serde_json::from_str(blob)
            .map_err(|err| MalformedFeatureData::InvalidJson(err.to_string()))?;
        match value {
            Value::Array(items) => {
                let mut flags = BTreeSet::new();
                for item in items {
                    let Value::String(name) = item else {
                        return Err(MalformedFeatureData::NonStringItem);
                    };
                    flags.insert(name);
                }
                Ok(Self(flags))
            }
            Value::Object(entries) => {
                let mut flags = BTreeSet::new();
                for (name, enabled) in entries {
                    match enabled {
                        Value::Bool(true) => {
                            flags.insert(name);
                        }
                        Value::Bool(false) => {}
                        _ => return Err(MalformedFeatureData::NonBooleanValue),
                    }
                }
                Ok(Self(flags))
            }
            _ => Err(MalformedFeatureData::UnsupportedShape),
        }
    }

    /// Returns true when `name` is enabled.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Iterates enabled flag names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns the number of enabled flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no flags are enabled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// SECTION: Request Identity
// ============================================================================

/// Verified identity claims handed in by upstream identity verification.
///
/// # Invariants
/// - Produced only after verification succeeded; treated as read-only.
/// - `tenant_id_claim` is only meaningful when `authenticated` is true.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestIdentity {
    /// Whether the caller presented a verified credential.
    pub authenticated: bool,
    /// Tenant claim carried by the verified credential.
    pub tenant_id_claim: Option<TenantId>,
    /// Remaining verified claims, untouched.
    #[serde(default)]
    pub raw_claims: Map<String, Value>,
}

impl RequestIdentity {
    /// Returns an unauthenticated identity with no claims.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Returns an authenticated identity with an optional tenant claim.
    #[must_use]
    pub fn authenticated(tenant_id_claim: Option<TenantId>) -> Self {
        Self {
            authenticated: true,
            tenant_id_claim,
            raw_claims: Map::new(),
        }
    }

    /// Returns a copy carrying the provided raw claims.
    #[must_use]
    pub fn with_raw_claims(mut self, raw_claims: Map<String, Value>) -> Self {
        self.raw_claims = raw_claims;
        self
    }

    /// Returns the tenant claim when the identity is authenticated.
    #[must_use]
    pub const fn verified_tenant_claim(&self) -> Option<TenantId> {
        if self.authenticated { self.tenant_id_claim } else { None }
    }
}

// ============================================================================
// SECTION: Host Normalization
// ============================================================================

/// Normalizes a request host or stored domain for directory lookups.
///
/// Lowercases, strips a port (including bracketed IPv6 hosts) and a trailing
/// dot. Returns `None` when nothing remains.
#[must_use]
pub fn normalize_host(host: &str) -> Option<String> {
    let trimmed = host.trim();
    let without_port = if let Some(rest) = trimmed.strip_prefix('[') {
        rest.split_once(']').map_or(rest, |(inner, _)| inner)
    } else if trimmed.matches(':').count() == 1 {
        trimmed.split_once(':').map_or(trimmed, |(name, _)| name)
    } else {
        trimmed
    };
    let normalized = without_port.trim_end_matches('.').to_ascii_lowercase();
    if normalized.is_empty() { None } else { Some(normalized) }
}
