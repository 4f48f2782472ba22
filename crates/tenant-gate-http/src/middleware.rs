// crates/tenant-gate-http/src/middleware.rs
// ============================================================================
// Module: Tenancy Middleware
// Description: axum middleware and extractor for request-time tenancy.
// Purpose: Run the pipeline per request and expose the tenant to handlers.
// Dependencies: tenant-gate-core, axum, tracing
// ============================================================================

//! ## Overview
//! [`tenancy_middleware`] converts the axum request into an
//! [`InboundRequest`], runs the pipeline, and on success stores the tenant
//! context, client identity, and verified identity in request extensions.
//! [`rate_limit_middleware`] throttles by client key ahead of it.
//!
//! An upstream authentication layer hands in a verified identity by
//! inserting a [`RequestIdentity`] into request extensions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ConnectInfo;
use axum::extract::FromRequestParts;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::HOST;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::middleware::from_fn_with_state;
use axum::response::IntoResponse;
use axum::response::Response;
use tenant_gate_core::InboundRequest;
use tenant_gate_core::RequestHeaders;
use tenant_gate_core::RequestIdentity;
use tenant_gate_core::TenantContext;
use tracing::debug;

use crate::error::TenancyHttpError;
use crate::rate_limit::RateLimitDecision;
use crate::state::TenancyLayerState;

// ============================================================================
// SECTION: Router Wiring
// ============================================================================

/// Wraps `router` with rate limiting (outer) and tenancy (inner) layers.
///
/// The router must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn protect<S>(router: Router<S>, state: TenancyLayerState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(from_fn_with_state(state.clone(), tenancy_middleware))
        .layer(from_fn_with_state(state, rate_limit_middleware))
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Per-client rate limiting keyed by the trust-boundary client identity.
pub async fn rate_limit_middleware(
    State(state): State<TenancyLayerState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = state.rate_limiter.as_ref() else {
        return next.run(request).await;
    };
    let pipeline = &state.pipeline;
    let forwarded = header_value(request.headers(), pipeline.forwarded_header_name());
    let client = pipeline.identifier().identify(peer.ip(), forwarded);
    match limiter.check(&client.key) {
        RateLimitDecision::Allowed {
            ..
        } => next.run(request).await,
        RateLimitDecision::Limited {
            retry_after,
        } => {
            debug!(client = %client.key, "client rate limited");
            TenancyHttpError::RateLimited {
                retry_after,
            }
            .into_response()
        }
    }
}

/// Resolves the tenant for the request and publishes it to handlers.
pub async fn tenancy_middleware(
    State(state): State<TenancyLayerState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut request: Request,
    next: Next,
) -> Response {
    let inbound = inbound_request(peer, &request);
    match state.pipeline.run(inbound, state.requirement).await {
        Ok(outcome) => {
            let extensions = request.extensions_mut();
            extensions.insert(Arc::new(outcome.context));
            extensions.insert(outcome.client);
            extensions.insert(outcome.identity);
            next.run(request).await
        }
        Err(rejection) => TenancyHttpError::Rejected(rejection.rejection).into_response(),
    }
}

/// Collects the pipeline inputs from an axum request.
fn inbound_request(peer: SocketAddr, request: &Request) -> InboundRequest {
    let host = header_value(request.headers(), HOST.as_str())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|authority| authority.as_str().to_string()));
    InboundRequest {
        peer_addr: peer.ip(),
        host,
        path: request.uri().path().to_string(),
        headers: request_headers(request.headers()),
        upstream_identity: request.extensions().get::<RequestIdentity>().cloned(),
    }
}

/// Copies text-valued headers into the pipeline's case-insensitive map.
fn request_headers(headers: &HeaderMap) -> RequestHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|value| (name.as_str(), value)))
        .collect()
}

/// Returns a header value when it is valid text.
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

// ============================================================================
// SECTION: Extractor
// ============================================================================

/// Handler extractor for the resolved tenant context.
///
/// The context is shared and immutable; handlers cannot retarget it.
#[derive(Debug, Clone)]
pub struct CurrentTenant(pub Arc<TenantContext>);

impl<S> FromRequestParts<S> for CurrentTenant
where
    S: Send + Sync,
{
    type Rejection = TenancyHttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Arc<TenantContext>>()
            .cloned()
            .map(Self)
            .ok_or(TenancyHttpError::MissingTenantContext)
    }
}
