// crates/tenant-gate-http/src/error.rs
// ============================================================================
// Module: HTTP Error Responses
// Description: Maps tenancy rejections onto HTTP status codes and JSON bodies.
// Purpose: Keep client-visible failures generic and stable.
// Dependencies: tenant-gate-core, axum, serde
// ============================================================================

//! ## Overview
//! Every failure the adapter returns is a JSON body of the form
//! `{"error": {"kind": "...", "message": "..."}}`. Kinds are stable labels;
//! messages never name a tenant.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use axum::Json;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;
use tenant_gate_core::Rejection;

// ============================================================================
// SECTION: Error Type
// ============================================================================

/// Client-visible adapter failures.
///
/// # Invariants
/// - Variants are stable for error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenancyHttpError {
    /// Pipeline rejected the request.
    Rejected(Rejection),
    /// Client exceeded its request budget.
    RateLimited {
        /// Time until the client's window resets.
        retry_after: Duration,
    },
    /// Handler asked for a tenant but no tenancy layer ran.
    MissingTenantContext,
}

impl TenancyHttpError {
    /// Returns the HTTP status for the failure.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::Rejected(Rejection::Unauthenticated) => StatusCode::UNAUTHORIZED,
            Self::Rejected(Rejection::TenantConflict | Rejection::TenantRequired) => {
                StatusCode::FORBIDDEN
            }
            Self::Rejected(Rejection::DirectoryUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimited {
                ..
            } => StatusCode::TOO_MANY_REQUESTS,
            Self::MissingTenantContext => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the stable error kind label.
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::Rejected(rejection) => rejection.as_str(),
            Self::RateLimited {
                ..
            } => "rate_limited",
            Self::MissingTenantContext => "internal",
        }
    }

    /// Returns the client-safe message.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Rejected(rejection) => rejection.public_message(),
            Self::RateLimited {
                ..
            } => "too many requests",
            Self::MissingTenantContext => "internal error",
        }
    }
}

/// Whole seconds a client should wait, rounded up and never zero.
pub(crate) fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    let rounded = if retry_after.subsec_nanos() > 0 { secs.saturating_add(1) } else { secs };
    rounded.max(1)
}

// ============================================================================
// SECTION: Response Body
// ============================================================================

/// JSON error envelope.
#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    /// Error payload.
    error: ErrorBody,
}

/// JSON error payload.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Stable error kind.
    kind: &'static str,
    /// Client-safe message.
    message: &'static str,
}

impl IntoResponse for TenancyHttpError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            error: ErrorBody {
                kind: self.kind(),
                message: self.message(),
            },
        };
        let mut response = (self.status(), Json(body)).into_response();
        if let Self::RateLimited {
            retry_after,
        } = self
        {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs(retry_after)));
        }
        response
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
