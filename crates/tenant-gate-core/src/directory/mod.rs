// crates/tenant-gate-core/src/directory/mod.rs
// ============================================================================
// Module: Tenant Directory
// Description: Lookup interface over the external tenant store.
// Purpose: Define the read-mostly tenant lookups used during resolution.
// Dependencies: async-trait, thiserror
// ============================================================================

//! ## Overview
//! The tenant directory is the only suspension point in tenant resolution.
//! Backends implement [`TenantDirectory`]; [`CachedTenantDirectory`] wraps any
//! backend with a short-lived, shared cache so a resolution pass does not
//! storm the store.
//!
//! Security posture: a directory outage is never "tenant not found". Every
//! backend failure surfaces as [`DirectoryError`] so callers fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::TenantId;
use crate::core::TenantRecord;
use crate::core::TenantSettings;
use crate::core::TenantSlug;

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod cache;
pub mod memory;

pub use cache::CachedTenantDirectory;
pub use cache::DEFAULT_CACHE_MAX_ENTRIES;
pub use cache::DEFAULT_CACHE_TTL;
pub use cache::DirectoryCacheConfig;
pub use memory::InMemoryTenantDirectory;

// ============================================================================
// SECTION: Interface
// ============================================================================

/// Tenant directory interface.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Finds the tenant bound to a normalized domain.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the backing store is unavailable.
    async fn find_by_domain(&self, domain: &str) -> Result<Option<TenantRecord>, DirectoryError>;

    /// Finds the tenant with the given slug.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the backing store is unavailable.
    async fn find_by_slug(&self, slug: &TenantSlug)
    -> Result<Option<TenantRecord>, DirectoryError>;

    /// Returns true when the tenant exists and is active.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the backing store is unavailable.
    async fn exists_and_active(&self, tenant_id: TenantId) -> Result<bool, DirectoryError>;

    /// Loads all settings for the tenant.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the backing store is unavailable.
    async fn get_settings(&self, tenant_id: TenantId) -> Result<TenantSettings, DirectoryError>;

    /// Loads the opaque serialized feature flag blob for the tenant.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the backing store is unavailable.
    async fn get_feature_blob(&self, tenant_id: TenantId)
    -> Result<Option<String>, DirectoryError>;
}

/// Shared, thread-safe tenant directory handle.
pub type SharedTenantDirectory = Arc<dyn TenantDirectory>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tenant directory failures.
///
/// # Invariants
/// - Every variant means "the store could not answer", never "no such tenant".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// Backing store is unreachable or refused the request.
    #[error("tenant directory unavailable: {0}")]
    Unavailable(String),
    /// Lookup exceeded its deadline.
    #[error("tenant directory lookup timed out")]
    Timeout,
    /// Backing store returned data that violates directory invariants.
    #[error("tenant directory data corrupt: {0}")]
    Corrupt(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
