// crates/tenant-gate-core/src/resolver.rs
// ============================================================================
// Module: Tenant Resolver
// Description: Multi-source tenant resolution with precedence and conflicts.
// Purpose: Map host, headers, verified claims, and path to a single tenant.
// Dependencies: serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! Resolution walks a fixed precedence chain and the first success wins:
//!
//! 1. Host bound to an active tenant's domain.
//! 2. Explicit tenant header naming an active tenant, reconciled against the
//!    verified claim. A disagreement is a conflict, not a fallback.
//! 3. Verified identity tenant claim.
//! 4. First path segment matching an active tenant slug.
//! 5. The configured default tenant.
//!
//! Security posture: a missing or unknown signal falls through, but a
//! directory outage fails closed. The default tenant is never substituted for
//! an unanswered lookup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

use crate::core::RequestIdentity;
use crate::core::TenantId;
use crate::core::TenantSlug;
use crate::core::normalize_host;
use crate::directory::DirectoryError;
use crate::directory::SharedTenantDirectory;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default explicit tenant header name.
pub const DEFAULT_TENANT_HEADER: &str = "X-Tenant-ID";

// ============================================================================
// SECTION: Request Inputs
// ============================================================================

/// Case-insensitive request header lookup.
///
/// # Invariants
/// - Names are stored lowercase; the first value for a name wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders(BTreeMap<String, String>);

impl RequestHeaders {
    /// Creates an empty header set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds a header unless one with the same name is already present.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.entry(name.to_ascii_lowercase()).or_insert_with(|| value.into());
    }

    /// Returns the header value for `name`, ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for RequestHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value);
        }
        headers
    }
}

/// Inputs consumed by a single resolution pass.
#[derive(Debug, Clone, Default)]
pub struct ResolutionRequest {
    /// Request host, possibly with a port.
    pub host: Option<String>,
    /// Request headers.
    pub headers: RequestHeaders,
    /// Verified identity from upstream authentication.
    pub identity: RequestIdentity,
    /// Request path (no query string).
    pub path: String,
}

// ============================================================================
// SECTION: Resolution Results
// ============================================================================

/// Signal that produced the resolved tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Host matched a tenant domain.
    Domain,
    /// Explicit tenant header.
    Header,
    /// Verified identity claim.
    Claim,
    /// First path segment matched a tenant slug.
    PathSlug,
    /// No signal; configured default tenant.
    Default,
}

impl ResolutionSource {
    /// Returns the stable label for logs and audit records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Header => "header",
            Self::Claim => "claim",
            Self::PathSlug => "path_slug",
            Self::Default => "default",
        }
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTenant {
    /// Resolved tenant identifier.
    pub tenant_id: TenantId,
    /// Signal that produced the tenant.
    pub source: ResolutionSource,
    /// Tenant slug when the resolving lookup returned the record.
    pub slug: Option<TenantSlug>,
}

impl ResolvedTenant {
    /// Builds a resolution result without a slug.
    #[must_use]
    pub const fn new(tenant_id: TenantId, source: ResolutionSource) -> Self {
        Self {
            tenant_id,
            source,
            slug: None,
        }
    }
}

/// Resolution failures.
///
/// # Invariants
/// - Variants are stable for error classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// Header tenant disagrees with the verified claim tenant.
    #[error("tenant header {header} conflicts with verified claim {claim}")]
    TenantConflict {
        /// Tenant named by the explicit header.
        header: TenantId,
        /// Tenant named by the verified identity claim.
        claim: TenantId,
    },
    /// Directory could not answer.
    #[error(transparent)]
    DirectoryUnavailable(#[from] DirectoryError),
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Tenant resolver over a (cached) tenant directory.
#[derive(Clone)]
pub struct TenantResolver {
    /// Tenant directory, normally wrapped in a cache.
    directory: SharedTenantDirectory,
    /// Tenant used when no signal is present.
    default_tenant_id: TenantId,
    /// Explicit tenant header name.
    header_name: String,
}

impl TenantResolver {
    /// Creates a resolver using the default tenant header name.
    #[must_use]
    pub fn new(directory: SharedTenantDirectory, default_tenant_id: TenantId) -> Self {
        Self {
            directory,
            default_tenant_id,
            header_name: DEFAULT_TENANT_HEADER.to_string(),
        }
    }

    /// Overrides the explicit tenant header name.
    #[must_use]
    pub fn with_header_name(mut self, header_name: impl Into<String>) -> Self {
        self.header_name = header_name.into();
        self
    }

    /// Returns the default tenant.
    #[must_use]
    pub const fn default_tenant_id(&self) -> TenantId {
        self.default_tenant_id
    }

    /// Returns the explicit tenant header name.
    #[must_use]
    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Resolves the tenant for a request.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::TenantConflict`] when the header and the
    /// verified claim disagree, and [`ResolutionError::DirectoryUnavailable`]
    /// when any lookup fails.
    pub async fn resolve(
        &self,
        request: &ResolutionRequest,
    ) -> Result<ResolvedTenant, ResolutionError> {
        if let Some(resolved) = self.resolve_domain(request.host.as_deref()).await? {
            return Ok(resolved);
        }

        let claim = request.identity.verified_tenant_claim();
        if let Some(header) = self.resolve_header(&request.headers).await? {
            return match claim {
                Some(claim) if claim != header => {
                    warn!(
                        header_tenant = %header,
                        claim_tenant = %claim,
                        "tenant header conflicts with verified claim"
                    );
                    Err(ResolutionError::TenantConflict {
                        header,
                        claim,
                    })
                }
                _ => Ok(ResolvedTenant::new(header, ResolutionSource::Header)),
            };
        }

        if let Some(claim) = claim {
            return Ok(ResolvedTenant::new(claim, ResolutionSource::Claim));
        }

        if let Some(resolved) = self.resolve_path(&request.path).await? {
            return Ok(resolved);
        }

        debug!(tenant = %self.default_tenant_id, "no tenant signal; using default tenant");
        Ok(ResolvedTenant::new(self.default_tenant_id, ResolutionSource::Default))
    }

    /// Step 1: exact binding of the normalized request host.
    async fn resolve_domain(
        &self,
        host: Option<&str>,
    ) -> Result<Option<ResolvedTenant>, DirectoryError> {
        let Some(domain) = host.and_then(normalize_host) else {
            return Ok(None);
        };
        match self.directory.find_by_domain(&domain).await? {
            Some(record) if record.active => Ok(Some(ResolvedTenant {
                tenant_id: record.id,
                source: ResolutionSource::Domain,
                slug: Some(record.slug),
            })),
            Some(record) => {
                debug!(tenant = %record.id, "domain bound to inactive tenant; falling through");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Step 2: explicit header naming an existing, active tenant.
    async fn resolve_header(
        &self,
        headers: &RequestHeaders,
    ) -> Result<Option<TenantId>, DirectoryError> {
        let Some(raw) = headers.get(&self.header_name) else {
            return Ok(None);
        };
        let Some(tenant_id) = TenantId::parse_untrusted(raw) else {
            debug!(header = %self.header_name, "tenant header is not a tenant id; falling through");
            return Ok(None);
        };
        if self.directory.exists_and_active(tenant_id).await? {
            return Ok(Some(tenant_id));
        }
        debug!(tenant = %tenant_id, "tenant header names no active tenant; falling through");
        Ok(None)
    }

    /// Step 4: first path segment as a tenant slug.
    async fn resolve_path(&self, path: &str) -> Result<Option<ResolvedTenant>, DirectoryError> {
        let Some(segment) = first_path_segment(path) else {
            return Ok(None);
        };
        let Ok(slug) = TenantSlug::parse(segment) else {
            return Ok(None);
        };
        match self.directory.find_by_slug(&slug).await? {
            Some(record) if record.active => Ok(Some(ResolvedTenant {
                tenant_id: record.id,
                source: ResolutionSource::PathSlug,
                slug: Some(record.slug),
            })),
            Some(record) => {
                debug!(tenant = %record.id, "path slug names inactive tenant; falling through");
                Ok(None)
            }
            None => {
                debug!(slug = %slug, "path slug names no tenant; falling through");
                Ok(None)
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the first non-empty `/`-delimited path segment.
fn first_path_segment(path: &str) -> Option<&str> {
    path.trim_start_matches('/').split('/').next().filter(|segment| !segment.is_empty())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
