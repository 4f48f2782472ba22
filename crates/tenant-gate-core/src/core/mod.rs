// crates/tenant-gate-core/src/core/mod.rs
// ============================================================================
// Module: Tenant Gate Core Types
// Description: Canonical tenant identifiers, records, and identity claims.
// Purpose: Provide stable, serializable types shared by every Tenant Gate layer.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Core types are the vocabulary of tenant resolution: identifiers, directory
//! records, settings, feature sets, and the verified identity consumed from
//! upstream authentication.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod identifiers;
pub mod tenant;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use identifiers::MAX_SLUG_LENGTH;
pub use identifiers::SlugError;
pub use identifiers::TenantId;
pub use identifiers::TenantSlug;
pub use tenant::FeatureSet;
pub use tenant::MalformedFeatureData;
pub use tenant::RequestIdentity;
pub use tenant::TenantRecord;
pub use tenant::TenantSettings;
pub use tenant::normalize_host;
