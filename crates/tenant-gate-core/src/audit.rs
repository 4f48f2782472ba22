// crates/tenant-gate-core/src/audit.rs
// ============================================================================
// Module: Tenancy Audit Logging
// Description: Structured audit events for tenant resolution decisions.
// Purpose: Emit JSON-line audit records without a hard logging dependency.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every pipeline pass ends in exactly one [`TenancyAuditEvent`]. Conflict
//! events carry both conflicting tenant ids so operators can investigate;
//! client-facing responses never do.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use tracing::warn;

use crate::core::TenantId;
use crate::pipeline::PipelineStage;
use crate::resolver::ResolutionSource;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Final decision for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TenancyDecision {
    /// Request continues with a resolved tenant.
    Allowed,
    /// Request was rejected by the pipeline.
    Rejected,
}

/// Tenancy audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct TenancyAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Final decision.
    pub decision: TenancyDecision,
    /// Decision reason label.
    pub reason: &'static str,
    /// Abuse-control partition key.
    pub client_key: String,
    /// Physical peer address.
    pub peer_ip: String,
    /// Resolution signal when a tenant was resolved.
    pub resolution_source: Option<ResolutionSource>,
    /// Resolved tenant id.
    pub tenant_id: Option<TenantId>,
    /// Header tenant id (conflicts only).
    pub header_tenant_id: Option<TenantId>,
    /// Verified claim tenant id (conflicts only).
    pub claim_tenant_id: Option<TenantId>,
    /// Stages visited by the pipeline.
    pub stages: Vec<PipelineStage>,
}

/// Inputs required to construct a tenancy audit event.
pub struct TenancyAuditEventParams {
    /// Final decision.
    pub decision: TenancyDecision,
    /// Decision reason label.
    pub reason: &'static str,
    /// Abuse-control partition key.
    pub client_key: String,
    /// Physical peer address.
    pub peer_ip: String,
    /// Resolution signal when a tenant was resolved.
    pub resolution_source: Option<ResolutionSource>,
    /// Resolved tenant id.
    pub tenant_id: Option<TenantId>,
    /// Header tenant id (conflicts only).
    pub header_tenant_id: Option<TenantId>,
    /// Verified claim tenant id (conflicts only).
    pub claim_tenant_id: Option<TenantId>,
    /// Stages visited by the pipeline.
    pub stages: Vec<PipelineStage>,
}

impl TenancyAuditEvent {
    /// Builds a tenancy audit event stamped with the current time.
    #[must_use]
    pub fn new(params: TenancyAuditEventParams) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event: "tenancy_decision",
            timestamp_ms,
            decision: params.decision,
            reason: params.reason,
            client_key: params.client_key,
            peer_ip: params.peer_ip,
            resolution_source: params.resolution_source,
            tenant_id: params.tenant_id,
            header_tenant_id: params.header_tenant_id,
            claim_tenant_id: params.claim_tenant_id,
            stages: params.stages,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for tenancy decisions.
pub trait TenancyAuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &TenancyAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl TenancyAuditSink for StderrAuditSink {
    fn record(&self, event: &TenancyAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            #[allow(clippy::print_stderr, reason = "Stderr is this sink's output channel.")]
            {
                eprintln!("{payload}");
            }
        }
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one JSON line and flushes it.
    fn append(&self, payload: &str) -> io::Result<()> {
        let mut file =
            self.file.lock().map_err(|_| io::Error::other("audit file lock poisoned"))?;
        writeln!(file, "{payload}")?;
        file.flush()
    }
}

impl TenancyAuditSink for FileAuditSink {
    fn record(&self, event: &TenancyAuditEvent) {
        let result = serde_json::to_string(event)
            .map_err(io::Error::other)
            .and_then(|payload| self.append(&payload));
        if let Err(err) = result {
            warn!(event = event.event, error = %err, "tenancy audit event dropped");
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl TenancyAuditSink for NoopAuditSink {
    fn record(&self, _event: &TenancyAuditEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================
