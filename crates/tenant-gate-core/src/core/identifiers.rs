// crates/tenant-gate-core/src/core/identifiers.rs
// ============================================================================
// Module: Tenant Gate Identifiers
// Description: Canonical identifiers for tenants and tenant slugs.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Tenant identifiers are opaque, 1-based numbers. Slugs are the short,
//! URL-safe names used for link-style routing (`/acme/...`). Both types
//! validate at construction so resolver code never looks up garbage input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a tenant slug.
pub const MAX_SLUG_LENGTH: usize = 63;

// ============================================================================
// SECTION: Tenant Identifier
// ============================================================================

/// Tenant identifier.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(NonZeroU64);

impl TenantId {
    /// Creates a new tenant identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates a tenant identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Parses an untrusted header value into a tenant identifier.
    ///
    /// Surrounding whitespace is ignored. Returns `None` for empty, signed,
    /// non-numeric, overflowing, or zero values.
    #[must_use]
    pub fn parse_untrusted(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        trimmed.parse::<u64>().ok().and_then(Self::from_raw)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

// ============================================================================
// SECTION: Tenant Slug
// ============================================================================

/// Tenant slug used for path-based routing.
///
/// # Invariants
/// - 1..=[`MAX_SLUG_LENGTH`] characters.
/// - Lowercase ASCII alphanumerics and `-` only.
/// - Never starts or ends with `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantSlug(String);

impl TenantSlug {
    /// Parses and validates a slug.
    ///
    /// # Errors
    ///
    /// Returns [`SlugError`] when the value violates slug rules.
    pub fn parse(value: &str) -> Result<Self, SlugError> {
        if value.is_empty() {
            return Err(SlugError::Empty);
        }
        if value.len() > MAX_SLUG_LENGTH {
            return Err(SlugError::TooLong);
        }
        if value.starts_with('-') || value.ends_with('-') {
            return Err(SlugError::EdgeHyphen);
        }
        if !value.bytes().all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-')
        {
            return Err(SlugError::InvalidCharacter);
        }
        Ok(Self(value.to_string()))
    }

    /// Returns the slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TenantSlug {
    type Err = SlugError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for TenantSlug {
    type Error = SlugError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TenantSlug> for String {
    fn from(value: TenantSlug) -> Self {
        value.0
    }
}

/// Slug validation failures.
///
/// # Invariants
/// - Variants are stable for error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SlugError {
    /// Slug was empty.
    #[error("tenant slug must be non-empty")]
    Empty,
    /// Slug exceeded the maximum length.
    #[error("tenant slug exceeds max length")]
    TooLong,
    /// Slug started or ended with a hyphen.
    #[error("tenant slug must not start or end with '-'")]
    EdgeHyphen,
    /// Slug contained characters outside `[a-z0-9-]`.
    #[error("tenant slug contains invalid characters")]
    InvalidCharacter,
}
