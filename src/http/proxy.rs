//! Pass-through proxy to discovered services.
//!
//! `ANY /{service}/{*path}` is forwarded to one instance of `service`, with
//! the `/{service}` prefix stripped. Responses pass through untouched;
//! failures map to gateway status codes and are never absorbed. Names the
//! registry cannot resolve are answered before any breaker is touched.

use std::time::Instant;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
};

use crate::http::request::{request_id, X_REQUEST_ID};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::registry::ServiceName;
use crate::transport::{CallError, UpstreamRequest};

/// Breaker operation name for proxied calls.
pub const PROXY_OPERATION: &str = "proxy";

const ROUTE: &str = "proxy";

static HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub async fn proxy_handler(
    State(state): State<AppState>,
    Path((service, path)): Path<(String, String)>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let response = forward(&state, &service, &path, request).await;
    metrics::record_request(ROUTE, response.status().as_u16(), start);
    response
}

async fn forward(
    state: &AppState,
    service: &str,
    path: &str,
    request: Request<Body>,
) -> Response {
    let id = request_id(request.headers()).to_string();

    let Ok(service) = ServiceName::new(service) else {
        return (StatusCode::NOT_FOUND, "Unknown service").into_response();
    };

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.config.transport.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(
                request_id = %id,
                service = %service,
                error = %e,
                "Request body rejected"
            );
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let path_and_query = match parts.uri.query() {
        Some(query) => format!("/{}?{}", path, query),
        None => format!("/{}", path),
    };

    let mut upstream = UpstreamRequest::new(parts.method, path_and_query);
    upstream.headers = strip_hop_by_hop(parts.headers);
    upstream.headers.remove(header::HOST);
    if let Ok(value) = HeaderValue::from_str(&id) {
        upstream.headers.insert(X_REQUEST_ID, value);
    }
    upstream.body = body;

    tracing::debug!(
        request_id = %id,
        service = %service,
        path = %upstream.path_and_query,
        "Proxying request"
    );

    // Breakers exist only for names the registry knows.
    let endpoints = match state.transport.resolve(&service).await {
        Ok(endpoints) => endpoints,
        Err(e) => return error_response(&id, &service, &CallError::from(e)),
    };

    let breaker = state.breakers.get(&service, PROXY_OPERATION);
    let permit = match breaker.try_acquire() {
        Ok(permit) => permit,
        Err(e) => return error_response(&id, &service, &e),
    };
    if permit.is_probe() {
        tracing::info!(request_id = %id, service = %service, "Proxying half-open trial request");
    }

    match state.transport.forward_to(&service, &endpoints, upstream).await {
        Ok(response) => {
            if response.status().is_server_error() {
                permit.record_failure();
            } else {
                permit.record_success();
            }
            let (mut parts, body) = response.into_parts();
            parts.headers = strip_hop_by_hop(parts.headers);
            Response::from_parts(parts, body)
        }
        Err(e) => {
            permit.record_result::<()>(&Err(e.clone()));
            error_response(&id, &service, &e)
        }
    }
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers
}

fn error_response(request_id: &str, service: &ServiceName, error: &CallError) -> Response {
    let status = status_for(error);
    tracing::warn!(
        request_id = %request_id,
        service = %service,
        reason = error.kind(),
        status = status.as_u16(),
        "Proxy call failed"
    );
    (status, error.to_string()).into_response()
}

/// Gateway status for a failed proxied call.
pub fn status_for(error: &CallError) -> StatusCode {
    match error {
        CallError::BreakerOpen | CallError::NoEndpointsAvailable => StatusCode::SERVICE_UNAVAILABLE,
        CallError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        CallError::ConnectionError(_) | CallError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
        CallError::UpstreamError { status } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
    }
}
