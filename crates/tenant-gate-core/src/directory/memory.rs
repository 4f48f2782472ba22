// crates/tenant-gate-core/src/directory/memory.rs
// ============================================================================
// Module: In-Memory Tenant Directory
// Description: RwLock-backed tenant directory for tests and embedders.
// Purpose: Provide a deterministic directory with controllable failures.
// Dependencies: async-trait
// ============================================================================

//! ## Overview
//! [`InMemoryTenantDirectory`] keeps tenants, settings, and feature blobs in
//! process memory. It can be flipped into an outage state to exercise the
//! fail-closed paths, and counts backend lookups so cache behavior is
//! observable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;

use crate::core::TenantId;
use crate::core::TenantRecord;
use crate::core::TenantSettings;
use crate::core::TenantSlug;
use crate::core::normalize_host;
use crate::directory::DirectoryError;
use crate::directory::TenantDirectory;

// ============================================================================
// SECTION: Directory
// ============================================================================

/// Mutable directory contents.
#[derive(Debug, Default)]
struct DirectoryState {
    /// Tenant records keyed by id.
    tenants: BTreeMap<TenantId, TenantRecord>,
    /// Tenant settings keyed by id.
    settings: BTreeMap<TenantId, BTreeMap<String, String>>,
    /// Raw feature blobs keyed by id.
    features: BTreeMap<TenantId, String>,
}

/// In-memory tenant directory.
///
/// # Invariants
/// - Stored domains are normalized on insert.
/// - When the outage switch is on, every lookup fails with
///   [`DirectoryError::Unavailable`].
#[derive(Debug, Default)]
pub struct InMemoryTenantDirectory {
    /// Directory contents.
    state: RwLock<DirectoryState>,
    /// Simulated outage switch.
    unavailable: AtomicBool,
    /// Number of lookups served (including failed ones).
    lookups: AtomicU64,
}

impl InMemoryTenantDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a tenant record.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the directory lock is poisoned.
    pub fn upsert_tenant(&self, mut record: TenantRecord) -> Result<(), DirectoryError> {
        record.domain = record.domain.as_deref().and_then(normalize_host);
        let mut state = self.write()?;
        state.tenants.insert(record.id, record);
        Ok(())
    }

    /// Marks a tenant active or inactive.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the directory lock is poisoned.
    pub fn set_active(&self, tenant_id: TenantId, active: bool) -> Result<(), DirectoryError> {
        let mut state = self.write()?;
        if let Some(record) = state.tenants.get_mut(&tenant_id) {
            record.active = active;
        }
        Ok(())
    }

    /// Stores a single setting for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the directory lock is poisoned.
    pub fn put_setting(
        &self,
        tenant_id: TenantId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), DirectoryError> {
        let mut state = self.write()?;
        state.settings.entry(tenant_id).or_default().insert(key.into(), value.into());
        Ok(())
    }

    /// Stores the raw feature blob for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the directory lock is poisoned.
    pub fn put_feature_blob(
        &self,
        tenant_id: TenantId,
        blob: impl Into<String>,
    ) -> Result<(), DirectoryError> {
        let mut state = self.write()?;
        state.features.insert(tenant_id, blob.into());
        Ok(())
    }

    /// Turns the simulated outage on or off.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of lookups served so far.
    #[must_use]
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Records a lookup and fails when the outage switch is on.
    fn begin_lookup(&self) -> Result<(), DirectoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("in-memory directory offline".to_string()));
        }
        Ok(())
    }

    /// Acquires the state for reading.
    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, DirectoryState>, DirectoryError> {
        self.state.read().map_err(|_| DirectoryError::Unavailable("lock poisoned".to_string()))
    }

    /// Acquires the state for writing.
    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, DirectoryState>, DirectoryError> {
        self.state.write().map_err(|_| DirectoryError::Unavailable("lock poisoned".to_string()))
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<TenantRecord>, DirectoryError> {
        self.begin_lookup()?;
        let Some(domain) = normalize_host(domain) else {
            return Ok(None);
        };
        let state = self.read()?;
        Ok(state
            .tenants
            .values()
            .find(|record| record.domain.as_deref() == Some(domain.as_str()))
            .cloned())
    }

    async fn find_by_slug(
        &self,
        slug: &TenantSlug,
    ) -> Result<Option<TenantRecord>, DirectoryError> {
        self.begin_lookup()?;
        let state = self.read()?;
        Ok(state.tenants.values().find(|record| &record.slug == slug).cloned())
    }

    async fn exists_and_active(&self, tenant_id: TenantId) -> Result<bool, DirectoryError> {
        self.begin_lookup()?;
        let state = self.read()?;
        Ok(state.tenants.get(&tenant_id).is_some_and(|record| record.active))
    }

    async fn get_settings(&self, tenant_id: TenantId) -> Result<TenantSettings, DirectoryError> {
        self.begin_lookup()?;
        let state = self.read()?;
        Ok(state.settings.get(&tenant_id).cloned().map(TenantSettings::new).unwrap_or_default())
    }

    async fn get_feature_blob(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<String>, DirectoryError> {
        self.begin_lookup()?;
        let state = self.read()?;
        Ok(state.features.get(&tenant_id).cloned())
    }
}
