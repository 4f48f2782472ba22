// crates/tenant-gate-core/src/context.rs
// ============================================================================
// Module: Tenant Context
// Description: Request-scoped tenant context with lazy settings and features.
// Purpose: Be the only channel through which downstream code learns the tenant.
// Dependencies: thiserror, tokio, tracing
// ============================================================================

//! ## Overview
//! One [`TenantContext`] is built per request. The orchestrator owns it
//! mutably while resolving and then hands it downstream behind an `Arc`, so
//! nothing past the pipeline can retarget the tenant.
//!
//! Settings and features load on first access and are then a snapshot for
//! the rest of the request. Retargeting with [`TenantContext::set`] drops
//! both snapshots; data from two tenants is never mixed.
//!
//! Security posture: malformed feature data degrades to "no features" and a
//! directory failure surfaces as [`ContextError::Directory`], never as
//! another tenant's data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::core::FeatureSet;
use crate::core::TenantId;
use crate::core::TenantSettings;
use crate::core::TenantSlug;
use crate::directory::DirectoryError;
use crate::directory::SharedTenantDirectory;
use crate::resolver::ResolutionSource;
use crate::resolver::ResolvedTenant;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tenant context access failures.
///
/// # Invariants
/// - Variants are stable for error classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// No tenant has been set on this context.
    #[error("tenant context not resolved")]
    NotResolved,
    /// Directory could not load tenant data.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Request-scoped tenant context.
///
/// # Invariants
/// - Never shared between requests.
/// - Settings and features, once loaded, are not reloaded for this request.
pub struct TenantContext {
    /// Directory used for lazy loads.
    directory: SharedTenantDirectory,
    /// Resolution result, when set.
    resolved: Option<ResolvedTenant>,
    /// Lazily loaded settings snapshot.
    settings: OnceCell<TenantSettings>,
    /// Lazily loaded feature snapshot.
    features: OnceCell<FeatureSet>,
}

impl TenantContext {
    /// Creates an unresolved context.
    #[must_use]
    pub fn new(directory: SharedTenantDirectory) -> Self {
        Self {
            directory,
            resolved: None,
            settings: OnceCell::new(),
            features: OnceCell::new(),
        }
    }

    /// Sets the resolved tenant, dropping any loaded settings and features.
    pub fn set(&mut self, resolved: ResolvedTenant) {
        self.resolved = Some(resolved);
        self.settings = OnceCell::new();
        self.features = OnceCell::new();
    }

    /// Returns the resolution result, if any.
    #[must_use]
    pub const fn resolved(&self) -> Option<&ResolvedTenant> {
        self.resolved.as_ref()
    }

    /// Returns the resolved tenant id, if any.
    #[must_use]
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.resolved.as_ref().map(|resolved| resolved.tenant_id)
    }

    /// Returns the resolved tenant slug when the resolving lookup knew it.
    ///
    /// Only domain and path-slug resolution carry a slug. Header, claim, and
    /// default resolution return `None` even when the tenant has a slug.
    #[must_use]
    pub fn tenant_slug(&self) -> Option<&TenantSlug> {
        self.resolved.as_ref().and_then(|resolved| resolved.slug.as_ref())
    }

    /// Returns the signal that produced the tenant, if any.
    #[must_use]
    pub fn source(&self) -> Option<ResolutionSource> {
        self.resolved.as_ref().map(|resolved| resolved.source)
    }

    /// Returns the settings snapshot, loading it on first access.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when unresolved or the directory fails.
    pub async fn settings(&self) -> Result<&TenantSettings, ContextError> {
        let tenant_id = self.require_tenant()?;
        self.settings
            .get_or_try_init(|| async {
                self.directory.get_settings(tenant_id).await.map_err(ContextError::from)
            })
            .await
    }

    /// Returns the feature snapshot, loading it on first access.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when unresolved or the directory fails.
    pub async fn features(&self) -> Result<&FeatureSet, ContextError> {
        let tenant_id = self.require_tenant()?;
        self.features.get_or_try_init(|| self.load_features(tenant_id)).await
    }

    /// Returns a single setting value.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when unresolved or the directory fails.
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, ContextError> {
        Ok(self.settings().await?.get(key).map(str::to_string))
    }

    /// Returns true when the feature flag is enabled for the tenant.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when unresolved or the directory fails.
    pub async fn has_feature(&self, name: &str) -> Result<bool, ContextError> {
        Ok(self.features().await?.contains(name))
    }

    /// Returns the tenant id used to scope every data access.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::NotResolved`] when no tenant was set.
    pub fn current_tenant_id(&self) -> Result<TenantId, ContextError> {
        self.require_tenant()
    }

    /// Alias of [`TenantContext::has_feature`] for data-access layers.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when unresolved or the directory fails.
    pub async fn current_tenant_has_feature(&self, name: &str) -> Result<bool, ContextError> {
        self.has_feature(name).await
    }

    /// Alias of [`TenantContext::get_setting`] for data-access layers.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when unresolved or the directory fails.
    pub async fn current_tenant_setting(&self, key: &str) -> Result<Option<String>, ContextError> {
        self.get_setting(key).await
    }

    /// Returns the tenant id or [`ContextError::NotResolved`].
    fn require_tenant(&self) -> Result<TenantId, ContextError> {
        self.tenant_id().ok_or(ContextError::NotResolved)
    }

    /// Loads and parses the feature blob.
    async fn load_features(&self, tenant_id: TenantId) -> Result<FeatureSet, ContextError> {
        let Some(blob) = self.directory.get_feature_blob(tenant_id).await? else {
            return Ok(FeatureSet::empty());
        };
        let (features, malformed) = FeatureSet::parse_blob(&blob);
        if let Some(reason) = malformed {
            debug!(tenant = %tenant_id, %reason, "malformed feature data; no features enabled");
        }
        Ok(features)
    }
}

impl fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantContext")
            .field("resolved", &self.resolved)
            .field("settings_loaded", &self.settings.initialized())
            .field("features_loaded", &self.features.initialized())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
