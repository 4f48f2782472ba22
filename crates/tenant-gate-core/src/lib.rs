// crates/tenant-gate-core/src/lib.rs
// ============================================================================
// Module: Tenant Gate Core Library
// Description: Public API surface for request-time tenant isolation.
// Purpose: Expose tenant resolution, context, trust boundary, and pipeline.
// Dependencies: crate::{core, directory, resolver, context, proxy, pipeline}
// ============================================================================

//! ## Overview
//! Tenant Gate core decides, for every inbound request, which tenant's data
//! the request may touch and which client identity abuse control should key
//! on. It is transport-agnostic; HTTP wiring lives in `tenant-gate-http`.
//!
//! Security posture: every component fails closed. Directory outages and
//! expired deadlines reject the request instead of defaulting the tenant, and
//! forwarded-address headers are honored only from trusted proxies.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod client_identity;
pub mod context;
pub mod core;
pub mod directory;
pub mod pipeline;
pub mod proxy;
pub mod resolver;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use audit::TenancyAuditEvent;
pub use audit::TenancyAuditEventParams;
pub use audit::TenancyAuditSink;
pub use audit::TenancyDecision;
pub use client_identity::ClientIdentifier;
pub use client_identity::ClientIdentity;
pub use client_identity::IdentitySource;
pub use context::ContextError;
pub use context::TenantContext;
pub use directory::CachedTenantDirectory;
pub use directory::DEFAULT_CACHE_MAX_ENTRIES;
pub use directory::DEFAULT_CACHE_TTL;
pub use directory::DirectoryCacheConfig;
pub use directory::DirectoryError;
pub use directory::InMemoryTenantDirectory;
pub use directory::SharedTenantDirectory;
pub use directory::TenantDirectory;
pub use pipeline::AnonymousIdentityVerifier;
pub use pipeline::DEFAULT_FORWARDED_HEADER;
pub use pipeline::DEFAULT_RESOLUTION_TIMEOUT;
pub use pipeline::IdentityVerifier;
pub use pipeline::InboundRequest;
pub use pipeline::PipelineOutcome;
pub use pipeline::PipelineRejection;
pub use pipeline::PipelineSettings;
pub use pipeline::PipelineStage;
pub use pipeline::Rejection;
pub use pipeline::RequestPipeline;
pub use pipeline::TenantRequirement;
pub use pipeline::VerificationError;
pub use proxy::ProxyParseError;
pub use proxy::TrustedProxies;
pub use proxy::TrustedProxy;
pub use resolver::DEFAULT_TENANT_HEADER;
pub use resolver::RequestHeaders;
pub use resolver::ResolutionError;
pub use resolver::ResolutionRequest;
pub use resolver::ResolutionSource;
pub use resolver::ResolvedTenant;
pub use resolver::TenantResolver;
