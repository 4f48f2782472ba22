// crates/tenant-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: Tenant Gate SQLite Directory
// Description: SQLite-backed tenant directory for Tenant Gate.
// Purpose: Provide a durable TenantDirectory implementation.
// Dependencies: tenant-gate-core, rusqlite, tokio
// ============================================================================

//! ## Overview
//! This crate provides a `SQLite`-backed [`tenant_gate_core::TenantDirectory`]
//! with provisioning helpers for tooling and tests.
//! Security posture: database contents are untrusted and decoded fail-closed.

pub mod store;

pub use store::SqliteDirectoryConfig;
pub use store::SqliteDirectoryError;
pub use store::SqliteJournalMode;
pub use store::SqliteSyncMode;
pub use store::SqliteTenantDirectory;
