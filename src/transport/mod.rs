//! Load-balanced upstream transport.
//!
//! # Data Flow
//! ```text
//! (ServiceName, UpstreamRequest)
//!     → registry resolve (bounded by registry timeout)
//!     → load balancer picks one Endpoint
//!     → hyper client request (bounded by request timeout)
//!     → status / body mapped into Result<T, CallError>
//! ```
//!
//! # Design Decisions
//! - No retries here; the caller (breaker layer) owns that decision
//! - Timeouts are distinct from connection errors
//! - Parse failures are distinct from transport failures

pub mod client;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use thiserror::Error;

use crate::registry::RegistryError;

pub use client::{LoadBalancedTransport, TransportSettings};

/// Why an upstream call did not produce a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// Registry returned no live endpoint for the service.
    #[error("no endpoints available")]
    NoEndpointsAvailable,

    /// No response within the configured timeout.
    #[error("upstream call timed out")]
    Timeout,

    /// Connection could not be established or broke mid-exchange.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// Upstream answered with a non-2xx status.
    #[error("upstream returned status {status}")]
    UpstreamError { status: u16 },

    /// 2xx response whose body did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The circuit breaker rejected the call without attempting it.
    #[error("circuit breaker open")]
    BreakerOpen,
}

impl CallError {
    /// Whether this error counts against the breaker's failure ratio.
    ///
    /// 4xx responses are client errors and a completed exchange; a parse
    /// failure likewise proves the upstream answered.
    pub fn is_breaker_failure(&self) -> bool {
        match self {
            CallError::NoEndpointsAvailable
            | CallError::Timeout
            | CallError::ConnectionError(_) => true,
            CallError::UpstreamError { status } => *status >= 500,
            CallError::MalformedResponse(_) | CallError::BreakerOpen => false,
        }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::NoEndpointsAvailable => "no_endpoints",
            CallError::Timeout => "timeout",
            CallError::ConnectionError(_) => "connection_error",
            CallError::UpstreamError { .. } => "upstream_error",
            CallError::MalformedResponse(_) => "malformed_response",
            CallError::BreakerOpen => "breaker_open",
        }
    }
}

impl From<RegistryError> for CallError {
    fn from(e: RegistryError) -> Self {
        match e {
            // An unregistered service has no live instances.
            RegistryError::UnknownService(_) => CallError::NoEndpointsAvailable,
            RegistryError::Timeout => CallError::Timeout,
            RegistryError::Malformed(detail) => {
                CallError::MalformedResponse(format!("registry: {}", detail))
            }
            e @ RegistryError::Unavailable(_) => {
                CallError::ConnectionError(format!("registry: {}", e))
            }
        }
    }
}

/// A request to be sent to whichever endpoint the balancer picks.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Path plus optional query, always starting with `/`.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamRequest {
    pub fn new(method: Method, path_and_query: impl Into<String>) -> Self {
        let mut path_and_query = path_and_query.into();
        if !path_and_query.starts_with('/') {
            path_and_query.insert(0, '/');
        }
        Self {
            method,
            path_and_query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(path_and_query: impl Into<String>) -> Self {
        Self::new(Method::GET, path_and_query)
    }
}
