// crates/tenant-gate-http/src/state.rs
// ============================================================================
// Module: Tenancy Layer State
// Description: Shared state for the tenancy and rate limit middleware.
// Purpose: Assemble the pipeline, cache, audit sink, and limiter from config.
// Dependencies: tenant-gate-core, tenant-gate-config, async-trait, thiserror
// ============================================================================

//! ## Overview
//! [`TenancyLayerState`] is built once at startup from a validated
//! [`TenantGateConfig`] and a backing tenant directory. The directory is
//! wrapped in the shared TTL cache here, so every request on every worker
//! shares one cache.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tenant_gate_config::AuditConfig;
use tenant_gate_config::AuditSinkKind;
use tenant_gate_config::TenantGateConfig;
use tenant_gate_core::CachedTenantDirectory;
use tenant_gate_core::FileAuditSink;
use tenant_gate_core::IdentityVerifier;
use tenant_gate_core::InboundRequest;
use tenant_gate_core::NoopAuditSink;
use tenant_gate_core::RequestIdentity;
use tenant_gate_core::RequestPipeline;
use tenant_gate_core::SharedTenantDirectory;
use tenant_gate_core::StderrAuditSink;
use tenant_gate_core::TenancyAuditSink;
use tenant_gate_core::TenantRequirement;
use tenant_gate_core::VerificationError;
use thiserror::Error;

use crate::rate_limit::RateLimiter;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Adapter setup failures.
#[derive(Debug, Error)]
pub enum HttpSetupError {
    /// Configuration failed validation.
    #[error("tenancy config invalid: {0}")]
    Config(String),
    /// Audit sink could not be opened.
    #[error("audit sink unavailable: {0}")]
    Audit(String),
}

// ============================================================================
// SECTION: Identity Verifier
// ============================================================================

/// Verifier that trusts the identity an upstream layer placed in request
/// extensions.
///
/// Signature checking happens upstream; this verifier only decides whether a
/// missing identity is acceptable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionIdentityVerifier {
    /// Reject requests without an upstream identity.
    require_identity: bool,
}

impl ExtensionIdentityVerifier {
    /// Treats requests without an upstream identity as anonymous.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            require_identity: false,
        }
    }

    /// Rejects requests without an upstream identity.
    #[must_use]
    pub const fn required() -> Self {
        Self {
            require_identity: true,
        }
    }
}

#[async_trait]
impl IdentityVerifier for ExtensionIdentityVerifier {
    async fn verify(&self, request: &InboundRequest) -> Result<RequestIdentity, VerificationError> {
        match &request.upstream_identity {
            Some(identity) => Ok(identity.clone()),
            None if self.require_identity => Err(VerificationError::Missing),
            None => Ok(RequestIdentity::anonymous()),
        }
    }
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared middleware state.
#[derive(Clone)]
pub struct TenancyLayerState {
    /// Request pipeline.
    pub(crate) pipeline: Arc<RequestPipeline>,
    /// Tenant policy for protected routes.
    pub(crate) requirement: TenantRequirement,
    /// Optional per-client limiter.
    pub(crate) rate_limiter: Option<Arc<RateLimiter>>,
}

impl TenancyLayerState {
    /// Builds state from config, using the audit sink the config selects.
    ///
    /// # Errors
    ///
    /// Returns [`HttpSetupError`] when config is invalid or the audit sink
    /// cannot be opened.
    pub fn from_config(
        config: &TenantGateConfig,
        backend: SharedTenantDirectory,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Result<Self, HttpSetupError> {
        let audit = audit_sink_from_config(&config.audit)?;
        Self::from_config_with_audit(config, backend, verifier, audit)
    }

    /// Builds state from config with an explicit audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`HttpSetupError::Config`] when config is invalid.
    pub fn from_config_with_audit(
        config: &TenantGateConfig,
        backend: SharedTenantDirectory,
        verifier: Arc<dyn IdentityVerifier>,
        audit: Arc<dyn TenancyAuditSink>,
    ) -> Result<Self, HttpSetupError> {
        let settings =
            config.pipeline_settings().map_err(|err| HttpSetupError::Config(err.to_string()))?;
        let cached: SharedTenantDirectory =
            Arc::new(CachedTenantDirectory::new(backend, config.tenancy.cache_config()));
        let pipeline = RequestPipeline::new(settings, cached, verifier, audit);
        let rate_limiter =
            config.limits.rate_limit.as_ref().map(|limits| Arc::new(RateLimiter::new(limits)));
        Ok(Self {
            pipeline: Arc::new(pipeline),
            requirement: TenantRequirement::Optional,
            rate_limiter,
        })
    }

    /// Returns state that applies `requirement` to protected routes.
    #[must_use]
    pub const fn with_requirement(mut self, requirement: TenantRequirement) -> Self {
        self.requirement = requirement;
        self
    }

    /// Returns the shared pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    /// Returns the rate limiter when one is configured.
    #[must_use]
    pub const fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.rate_limiter.as_ref()
    }
}

/// Opens the audit sink selected by config.
///
/// # Errors
///
/// Returns [`HttpSetupError`] when the file sink cannot be opened or is
/// missing its path.
pub fn audit_sink_from_config(
    config: &AuditConfig,
) -> Result<Arc<dyn TenancyAuditSink>, HttpSetupError> {
    match config.sink {
        AuditSinkKind::Stderr => Ok(Arc::new(StderrAuditSink)),
        AuditSinkKind::None => Ok(Arc::new(NoopAuditSink)),
        AuditSinkKind::File => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| HttpSetupError::Config("audit.path is required".to_string()))?;
            let sink = FileAuditSink::new(Path::new(path.trim()))
                .map_err(|err| HttpSetupError::Audit(err.to_string()))?;
            Ok(Arc::new(sink))
        }
    }
}
