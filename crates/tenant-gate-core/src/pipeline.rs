// crates/tenant-gate-core/src/pipeline.rs
// ============================================================================
// Module: Request Pipeline
// Description: Per-request orchestration of identity, tenancy, and trust.
// Purpose: Sequence client identification, verification, and resolution.
// Dependencies: async-trait, serde, thiserror, tokio, tracing
// ============================================================================

//! ## Overview
//! [`RequestPipeline::run`] performs one pass per request:
//!
//! `Start -> IdentityVerified -> TenantResolved -> Ready`, or `Rejected` on
//! the first failure. Client identification runs before anything else so
//! abuse control covers unauthenticated traffic too. Tenant resolution runs
//! after verification because conflict detection needs the verified claim.
//!
//! Security posture: resolution is bounded by a deadline and an expired
//! deadline fails closed. Rejections expose only a generic public message;
//! the conflicting tenant ids go to the audit sink.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::audit::TenancyAuditEvent;
use crate::audit::TenancyAuditEventParams;
use crate::audit::TenancyAuditSink;
use crate::audit::TenancyDecision;
use crate::client_identity::ClientIdentifier;
use crate::client_identity::ClientIdentity;
use crate::context::TenantContext;
use crate::core::RequestIdentity;
use crate::core::TenantId;
use crate::directory::SharedTenantDirectory;
use crate::proxy::TrustedProxies;
use crate::resolver::DEFAULT_TENANT_HEADER;
use crate::resolver::RequestHeaders;
use crate::resolver::ResolutionError;
use crate::resolver::ResolutionRequest;
use crate::resolver::ResolutionSource;
use crate::resolver::ResolvedTenant;
use crate::resolver::TenantResolver;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default forwarded-address header name.
pub const DEFAULT_FORWARDED_HEADER: &str = "X-Forwarded-For";
/// Default deadline for a full resolution pass.
pub const DEFAULT_RESOLUTION_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// SECTION: Identity Verification
// ============================================================================

/// Inbound request facts visible to the pipeline.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Physical peer address of the connection.
    pub peer_addr: IpAddr,
    /// Request host, possibly with a port.
    pub host: Option<String>,
    /// Request path (no query string).
    pub path: String,
    /// Request headers.
    pub headers: RequestHeaders,
    /// Identity already verified by an upstream layer, if any.
    pub upstream_identity: Option<RequestIdentity>,
}

/// Identity verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// Credential was presented but rejected.
    #[error("credential rejected: {0}")]
    Rejected(String),
    /// Credential required but absent.
    #[error("credential required")]
    Missing,
}

/// Identity verification seam (signature checking lives upstream).
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Produces the verified identity for the request.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError`] when the request must be rejected as
    /// unauthenticated.
    async fn verify(&self, request: &InboundRequest) -> Result<RequestIdentity, VerificationError>;
}

/// Verifier that treats every request as anonymous.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousIdentityVerifier;

#[async_trait]
impl IdentityVerifier for AnonymousIdentityVerifier {
    async fn verify(
        &self,
        _request: &InboundRequest,
    ) -> Result<RequestIdentity, VerificationError> {
        Ok(RequestIdentity::anonymous())
    }
}

// ============================================================================
// SECTION: Stages and Rejections
// ============================================================================

/// Pipeline state machine stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Request accepted for processing.
    Start,
    /// Identity verification completed.
    IdentityVerified,
    /// Tenant resolved and context populated.
    TenantResolved,
    /// Request may proceed downstream.
    Ready,
    /// Request rejected (terminal).
    Rejected,
}

/// Rejection kinds.
///
/// # Invariants
/// - Variants are stable for error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// Identity verification failed.
    Unauthenticated,
    /// Header tenant contradicted the verified claim.
    TenantConflict,
    /// Directory outage or resolution deadline expired.
    DirectoryUnavailable,
    /// Endpoint demands an explicit tenant but only the default resolved.
    TenantRequired,
}

impl Rejection {
    /// Returns the stable label for logs and responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::TenantConflict => "tenant_conflict",
            Self::DirectoryUnavailable => "directory_unavailable",
            Self::TenantRequired => "tenant_required",
        }
    }

    /// Returns the client-safe message; never names a tenant.
    #[must_use]
    pub const fn public_message(self) -> &'static str {
        match self {
            Self::Unauthenticated | Self::TenantConflict | Self::TenantRequired => "access denied",
            Self::DirectoryUnavailable => "service unavailable",
        }
    }
}

/// Tenant policy demanded by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TenantRequirement {
    /// Default tenant is acceptable.
    #[default]
    Optional,
    /// A tenant signal must have been present.
    Explicit,
}

/// Rejected pipeline pass.
#[derive(Debug, Clone, Error)]
#[error("request rejected: {}", .rejection.as_str())]
pub struct PipelineRejection {
    /// Rejection kind.
    pub rejection: Rejection,
    /// Stages visited, ending in [`PipelineStage::Rejected`].
    pub stages: Vec<PipelineStage>,
    /// Derived client identity.
    pub client: ClientIdentity,
}

/// Successful pipeline pass.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Derived client identity.
    pub client: ClientIdentity,
    /// Verified identity.
    pub identity: RequestIdentity,
    /// Populated tenant context.
    pub context: TenantContext,
    /// Stages visited, ending in [`PipelineStage::Ready`].
    pub stages: Vec<PipelineStage>,
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Static pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Tenant used when no signal is present.
    pub default_tenant_id: TenantId,
    /// Explicit tenant header name.
    pub tenant_header_name: String,
    /// Forwarded-address header name.
    pub forwarded_header_name: String,
    /// Trusted proxy allow-list.
    pub trusted_proxies: TrustedProxies,
    /// Deadline for a resolution pass.
    pub resolution_timeout: Duration,
}

impl PipelineSettings {
    /// Returns settings with default header names, no trusted proxies, and
    /// the default deadline.
    #[must_use]
    pub fn new(default_tenant_id: TenantId) -> Self {
        Self {
            default_tenant_id,
            tenant_header_name: DEFAULT_TENANT_HEADER.to_string(),
            forwarded_header_name: DEFAULT_FORWARDED_HEADER.to_string(),
            trusted_proxies: TrustedProxies::default(),
            resolution_timeout: DEFAULT_RESOLUTION_TIMEOUT,
        }
    }
}

/// Facts recorded on a rejection audit event.
#[derive(Default)]
struct RejectionFacts {
    /// Resolution result when one was produced.
    resolved: Option<ResolvedTenant>,
    /// Header and claim tenants of a conflict.
    conflict: Option<(TenantId, TenantId)>,
}

/// Request pipeline orchestrator.
pub struct RequestPipeline {
    /// Trust-boundary client identifier.
    identifier: ClientIdentifier,
    /// Forwarded-address header name.
    forwarded_header_name: String,
    /// Identity verification seam.
    verifier: Arc<dyn IdentityVerifier>,
    /// Tenant resolver.
    resolver: TenantResolver,
    /// Directory handed to each tenant context.
    directory: SharedTenantDirectory,
    /// Deadline for a resolution pass.
    resolution_timeout: Duration,
    /// Audit sink for decisions.
    audit: Arc<dyn TenancyAuditSink>,
}

impl RequestPipeline {
    /// Builds a pipeline. `directory` should already be cached.
    #[must_use]
    pub fn new(
        settings: PipelineSettings,
        directory: SharedTenantDirectory,
        verifier: Arc<dyn IdentityVerifier>,
        audit: Arc<dyn TenancyAuditSink>,
    ) -> Self {
        let resolver = TenantResolver::new(Arc::clone(&directory), settings.default_tenant_id)
            .with_header_name(settings.tenant_header_name);
        Self {
            identifier: ClientIdentifier::new(settings.trusted_proxies),
            forwarded_header_name: settings.forwarded_header_name,
            verifier,
            resolver,
            directory,
            resolution_timeout: settings.resolution_timeout,
            audit,
        }
    }

    /// Returns the trust-boundary client identifier.
    #[must_use]
    pub const fn identifier(&self) -> &ClientIdentifier {
        &self.identifier
    }

    /// Returns the forwarded-address header name.
    #[must_use]
    pub fn forwarded_header_name(&self) -> &str {
        &self.forwarded_header_name
    }

    /// Runs one pipeline pass for a request.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineRejection`] when verification fails, the tenant
    /// header conflicts with the verified claim, the directory cannot answer
    /// within the deadline, or an explicit tenant is required but absent.
    pub async fn run(
        &self,
        request: InboundRequest,
        requirement: TenantRequirement,
    ) -> Result<PipelineOutcome, PipelineRejection> {
        let mut stages = vec![PipelineStage::Start];
        let peer_ip = request.peer_addr.to_string();
        let client = self
            .identifier
            .identify(request.peer_addr, request.headers.get(&self.forwarded_header_name));

        let identity = match self.verifier.verify(&request).await {
            Ok(identity) => identity,
            Err(err) => {
                warn!(client = %client.key, error = %err, "identity verification failed");
                return Err(self.reject(
                    Rejection::Unauthenticated,
                    stages,
                    client,
                    peer_ip,
                    RejectionFacts::default(),
                ));
            }
        };
        stages.push(PipelineStage::IdentityVerified);

        let resolution = ResolutionRequest {
            host: request.host,
            headers: request.headers,
            identity: identity.clone(),
            path: request.path,
        };
        let resolved = match tokio::time::timeout(
            self.resolution_timeout,
            self.resolver.resolve(&resolution),
        )
        .await
        {
            Ok(Ok(resolved)) => resolved,
            Ok(Err(ResolutionError::TenantConflict {
                header,
                claim,
            })) => {
                let facts = RejectionFacts {
                    conflict: Some((header, claim)),
                    ..RejectionFacts::default()
                };
                return Err(self.reject(Rejection::TenantConflict, stages, client, peer_ip, facts));
            }
            Ok(Err(ResolutionError::DirectoryUnavailable(err))) => {
                warn!(client = %client.key, error = %err, "tenant directory unavailable");
                return Err(self.reject(
                    Rejection::DirectoryUnavailable,
                    stages,
                    client,
                    peer_ip,
                    RejectionFacts::default(),
                ));
            }
            Err(_) => {
                warn!(
                    client = %client.key,
                    timeout_ms = self.resolution_timeout.as_millis(),
                    "tenant resolution deadline expired"
                );
                return Err(self.reject(
                    Rejection::DirectoryUnavailable,
                    stages,
                    client,
                    peer_ip,
                    RejectionFacts::default(),
                ));
            }
        };

        let mut context = TenantContext::new(Arc::clone(&self.directory));
        context.set(resolved.clone());
        stages.push(PipelineStage::TenantResolved);

        if requirement == TenantRequirement::Explicit && resolved.source == ResolutionSource::Default
        {
            let facts = RejectionFacts {
                resolved: Some(resolved),
                ..RejectionFacts::default()
            };
            return Err(self.reject(Rejection::TenantRequired, stages, client, peer_ip, facts));
        }

        stages.push(PipelineStage::Ready);
        self.audit.record(&TenancyAuditEvent::new(TenancyAuditEventParams {
            decision: TenancyDecision::Allowed,
            reason: "resolved",
            client_key: client.key.clone(),
            peer_ip,
            resolution_source: Some(resolved.source),
            tenant_id: Some(resolved.tenant_id),
            header_tenant_id: None,
            claim_tenant_id: None,
            stages: stages.clone(),
        }));
        Ok(PipelineOutcome {
            client,
            identity,
            context,
            stages,
        })
    }

    /// Terminates the pass with a rejection and records it.
    fn reject(
        &self,
        rejection: Rejection,
        mut stages: Vec<PipelineStage>,
        client: ClientIdentity,
        peer_ip: String,
        facts: RejectionFacts,
    ) -> PipelineRejection {
        stages.push(PipelineStage::Rejected);
        let (header_tenant_id, claim_tenant_id) = facts.conflict.unzip();
        self.audit.record(&TenancyAuditEvent::new(TenancyAuditEventParams {
            decision: TenancyDecision::Rejected,
            reason: rejection.as_str(),
            client_key: client.key.clone(),
            peer_ip,
            resolution_source: facts.resolved.as_ref().map(|resolved| resolved.source),
            tenant_id: facts.resolved.as_ref().map(|resolved| resolved.tenant_id),
            header_tenant_id,
            claim_tenant_id,
            stages: stages.clone(),
        }));
        PipelineRejection {
            rejection,
            stages,
            client,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
