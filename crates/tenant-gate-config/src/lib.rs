// crates/tenant-gate-config/src/lib.rs
// ============================================================================
// Module: Tenant Gate Config Library
// Description: Canonical config model and validation for Tenant Gate.
// Purpose: Single source of truth for tenant-gate.toml semantics.
// Dependencies: tenant-gate-core, serde, toml
// ============================================================================

//! ## Overview
//! `tenant-gate-config` defines the configuration model for tenant
//! resolution, trusted proxies, abuse-control limits, and audit output. It
//! validates strictly and fails closed.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
