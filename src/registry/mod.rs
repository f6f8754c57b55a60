//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! ServiceName ("order-service")
//!     → RegistryClient::resolve
//!         - static_registry.rs (in-process table, hot-reloadable)
//!         - eureka.rs (Eureka REST lookup)
//!         - cache.rs (optional TTL wrapper around either)
//!     → Vec<Endpoint> (possibly empty)
//! ```
//!
//! # Design Decisions
//! - Empty result is a normal answer, not an error
//! - Unregistered names are an error, distinct from "no healthy instances"
//! - Endpoints are resolved fresh per call; caching is opt-in and TTL-bounded

pub mod cache;
pub mod eureka;
pub mod static_registry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub use cache::CachingRegistry;
pub use eureka::EurekaRegistry;
pub use static_registry::StaticRegistry;

/// Logical name of a downstream service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceName(Arc<str>);

/// Rejected service name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("service name must not be empty")]
pub struct InvalidServiceName;

impl ServiceName {
    /// Create a service name, trimming surrounding whitespace.
    pub fn new(name: impl AsRef<str>) -> Result<Self, InvalidServiceName> {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            return Err(InvalidServiceName);
        }
        Ok(Self(Arc::from(trimmed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ServiceName {
    type Err = InvalidServiceName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// URL scheme of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// One reachable instance of a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

/// Failure to parse an endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointParseError {
    #[error("invalid endpoint url '{0}'")]
    InvalidUrl(String),
    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("endpoint url '{0}' has no host")]
    MissingHost(String),
}

impl Endpoint {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Parse `scheme://host[:port]`. Any path is ignored.
    pub fn parse(raw: &str) -> Result<Self, EndpointParseError> {
        let url = Url::parse(raw).map_err(|_| EndpointParseError::InvalidUrl(raw.to_string()))?;
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(EndpointParseError::UnsupportedScheme(other.to_string())),
        };
        let host = url
            .host_str()
            .ok_or_else(|| EndpointParseError::MissingHost(raw.to_string()))?
            .to_string();
        let port = url.port().unwrap_or_else(|| scheme.default_port());
        Ok(Self { scheme, host, port })
    }

    /// `scheme://host:port` authority part, used as the base of upstream URIs.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

/// Errors returned by registry lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry does not know this service at all.
    #[error("service '{0}' is not registered")]
    UnknownService(ServiceName),

    /// The registry could not be reached.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// The registry did not answer within the lookup timeout.
    #[error("registry lookup timed out")]
    Timeout,

    /// The registry answered with something we could not interpret.
    #[error("malformed registry response: {0}")]
    Malformed(String),
}

/// Resolves logical service names to live endpoints.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Current live endpoints for `service`, in registry order.
    ///
    /// Returns an empty vector when the service is registered but has no
    /// healthy instances.
    async fn resolve(&self, service: &ServiceName) -> Result<Vec<Endpoint>, RegistryError>;
}

#[async_trait]
impl<R: RegistryClient + ?Sized> RegistryClient for Arc<R> {
    async fn resolve(&self, service: &ServiceName) -> Result<Vec<Endpoint>, RegistryError> {
        (**self).resolve(service).await
    }
}
