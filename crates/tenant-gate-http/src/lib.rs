// crates/tenant-gate-http/src/lib.rs
// ============================================================================
// Module: Tenant Gate HTTP Adapter
// Description: axum integration for the Tenant Gate request pipeline.
// Purpose: Run tenancy and abuse control in front of HTTP handlers.
// Dependencies: tenant-gate-core, tenant-gate-config, axum
// ============================================================================

//! ## Overview
//! `tenant-gate-http` adapts [`tenant_gate_core::RequestPipeline`] to axum.
//! [`protect`] wraps a router with two middleware layers: the per-client rate
//! limiter runs first (so unauthenticated floods are throttled), then the
//! tenancy middleware resolves the tenant and hands handlers an immutable
//! [`CurrentTenant`].
//!
//! Security posture: rejections carry generic messages only; conflicting
//! tenant ids are written to the audit sink, never to the response.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod state;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::TenancyHttpError;
pub use middleware::CurrentTenant;
pub use middleware::protect;
pub use middleware::rate_limit_middleware;
pub use middleware::tenancy_middleware;
pub use rate_limit::RateLimitDecision;
pub use rate_limit::RateLimiter;
pub use state::ExtensionIdentityVerifier;
pub use state::HttpSetupError;
pub use state::TenancyLayerState;
pub use state::audit_sink_from_config;
