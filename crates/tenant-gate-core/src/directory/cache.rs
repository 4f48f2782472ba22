// crates/tenant-gate-core/src/directory/cache.rs
// ============================================================================
// Module: Cached Tenant Directory
// Description: Shared TTL cache in front of any tenant directory backend.
// Purpose: Absorb repeated domain/slug/existence lookups across requests.
// Dependencies: async-trait, tokio
// ============================================================================

//! ## Overview
//! [`CachedTenantDirectory`] is the only state shared across concurrent
//! requests. Entries are immutable once written and expire after a fixed
//! TTL so activation changes propagate without a restart. Concurrent
//! insert-on-miss is last-writer-wins; every writer computes the same value.
//!
//! Invariants:
//! - Errors are never cached.
//! - Negative results ("no such tenant") are cached for the same TTL.
//! - Settings and feature blobs are not cached here; the tenant context
//!   snapshots them per request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::core::TenantId;
use crate::core::TenantRecord;
use crate::core::TenantSettings;
use crate::core::TenantSlug;
use crate::core::normalize_host;
use crate::directory::DirectoryError;
use crate::directory::SharedTenantDirectory;
use crate::directory::TenantDirectory;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default cache entry lifetime (15 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);
/// Default maximum number of cached entries.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 4_096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Cache sizing and lifetime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryCacheConfig {
    /// Lifetime of a cache entry.
    pub ttl: Duration,
    /// Maximum number of live entries.
    pub max_entries: usize,
}

impl Default for DirectoryCacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

// ============================================================================
// SECTION: Cache Entries
// ============================================================================

/// Cache key per lookup kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    /// Normalized domain lookup.
    Domain(String),
    /// Slug lookup.
    Slug(TenantSlug),
    /// Existence/active lookup.
    Active(TenantId),
}

/// Cached lookup result.
#[derive(Debug, Clone)]
enum CachedValue {
    /// Domain or slug lookup result.
    Record(Option<TenantRecord>),
    /// Existence/active lookup result.
    Active(bool),
}

/// Cache entry with expiry.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Cached value.
    value: CachedValue,
    /// Instant after which the entry is stale.
    expires_at: Instant,
}

// ============================================================================
// SECTION: Cached Directory
// ============================================================================

/// TTL cache wrapping a tenant directory backend.
///
/// # Invariants
/// - Never holds more than `max_entries` entries.
/// - A lock is never held across an await point.
pub struct CachedTenantDirectory {
    /// Backing directory.
    inner: SharedTenantDirectory,
    /// Cache settings.
    config: DirectoryCacheConfig,
    /// Cached entries.
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl CachedTenantDirectory {
    /// Wraps a backend with the given cache settings.
    #[must_use]
    pub fn new(inner: SharedTenantDirectory, config: DirectoryCacheConfig) -> Self {
        Self {
            inner,
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cache settings.
    #[must_use]
    pub const fn config(&self) -> DirectoryCacheConfig {
        self.config
    }

    /// Returns the number of stored entries (including stale ones).
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the cache lock is poisoned.
    pub fn len(&self) -> Result<usize, DirectoryError> {
        Ok(self.entries.read().map_err(|_| poisoned())?.len())
    }

    /// Returns true when nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the cache lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, DirectoryError> {
        Ok(self.len()? == 0)
    }

    /// Drops every cached entry.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the cache lock is poisoned.
    pub fn invalidate_all(&self) -> Result<(), DirectoryError> {
        self.entries.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }

    /// Returns a fresh cached value for `key`.
    fn lookup(&self, key: &CacheKey) -> Result<Option<CachedValue>, DirectoryError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let now = Instant::now();
        Ok(entries.get(key).filter(|entry| entry.expires_at > now).map(|entry| entry.value.clone()))
    }

    /// Stores `value` under `key`, respecting the entry bound.
    fn store(&self, key: CacheKey, value: CachedValue) -> Result<(), DirectoryError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let now = Instant::now();
        if entries.len() >= self.config.max_entries && !entries.contains_key(&key) {
            entries.retain(|_, entry| entry.expires_at > now);
            if entries.len() >= self.config.max_entries {
                return Ok(());
            }
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + self.config.ttl,
            },
        );
        Ok(())
    }

    /// Serves a record lookup from cache or the backend.
    async fn cached_record<F>(
        &self,
        key: CacheKey,
        fetch: F,
    ) -> Result<Option<TenantRecord>, DirectoryError>
    where
        F: Future<Output = Result<Option<TenantRecord>, DirectoryError>> + Send,
    {
        if let Some(CachedValue::Record(record)) = self.lookup(&key)? {
            return Ok(record);
        }
        let record = fetch.await?;
        self.store(key, CachedValue::Record(record.clone()))?;
        Ok(record)
    }
}

#[async_trait]
impl TenantDirectory for CachedTenantDirectory {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<TenantRecord>, DirectoryError> {
        let Some(domain) = normalize_host(domain) else {
            return Ok(None);
        };
        let key = CacheKey::Domain(domain.clone());
        self.cached_record(key, self.inner.find_by_domain(&domain)).await
    }

    async fn find_by_slug(
        &self,
        slug: &TenantSlug,
    ) -> Result<Option<TenantRecord>, DirectoryError> {
        self.cached_record(CacheKey::Slug(slug.clone()), self.inner.find_by_slug(slug)).await
    }

    async fn exists_and_active(&self, tenant_id: TenantId) -> Result<bool, DirectoryError> {
        let key = CacheKey::Active(tenant_id);
        if let Some(CachedValue::Active(active)) = self.lookup(&key)? {
            return Ok(active);
        }
        let active = self.inner.exists_and_active(tenant_id).await?;
        self.store(key, CachedValue::Active(active))?;
        Ok(active)
    }

    async fn get_settings(&self, tenant_id: TenantId) -> Result<TenantSettings, DirectoryError> {
        self.inner.get_settings(tenant_id).await
    }

    async fn get_feature_blob(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<String>, DirectoryError> {
        self.inner.get_feature_blob(tenant_id).await
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Error for a poisoned cache lock.
fn poisoned() -> DirectoryError {
    DirectoryError::Unavailable("tenant cache lock poisoned".to_string())
}
