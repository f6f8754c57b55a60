//! HTTP client side of the transport.
//!
//! # Responsibilities
//! - Resolve and select an endpoint per call
//! - Enforce the request timeout over the whole exchange
//! - Map hyper outcomes into [`CallError`]
//!
//! Dropping a returned future drops the hyper request with it, which closes
//! the upstream connection instead of leaking it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Request, Response, Uri};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::de::DeserializeOwned;

use crate::config::TransportConfig;
use crate::load_balancer::LoadBalancer;
use crate::observability::metrics;
use crate::registry::{Endpoint, RegistryClient, RegistryError, ServiceName};
use crate::transport::{CallError, UpstreamRequest};

/// Timeouts and limits applied to every call.
#[derive(Debug, Clone, Copy)]
pub struct TransportSettings {
    pub request_timeout: Duration,
    pub registry_timeout: Duration,
    pub max_body_bytes: usize,
}

impl TransportSettings {
    pub fn from_config(transport: &TransportConfig, registry_timeout: Duration) -> Self {
        Self {
            request_timeout: Duration::from_millis(transport.request_timeout_ms),
            registry_timeout,
            max_body_bytes: transport.max_body_bytes,
        }
    }
}

/// Sends requests to one instance of a logical service.
pub struct LoadBalancedTransport {
    registry: Arc<dyn RegistryClient>,
    balancer: Arc<dyn LoadBalancer>,
    client: Client<HttpConnector, Body>,
    settings: TransportSettings,
}

impl LoadBalancedTransport {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        balancer: Arc<dyn LoadBalancer>,
        settings: TransportSettings,
    ) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            registry,
            balancer,
            client,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<dyn RegistryClient> {
        &self.registry
    }

    /// Issue `request` and parse a 2xx JSON body into `T`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        service: &ServiceName,
        request: UpstreamRequest,
    ) -> Result<T, CallError> {
        let start = Instant::now();
        let result = self.call_inner(service, request).await;
        metrics::record_upstream_call(service.as_str(), outcome_label(&result), start);
        result
    }

    /// Send `request` to one of `endpoints` and hand back the raw response,
    /// whatever its status.
    pub async fn forward_to(
        &self,
        service: &ServiceName,
        endpoints: &[Endpoint],
        request: UpstreamRequest,
    ) -> Result<Response<Body>, CallError> {
        let start = Instant::now();
        let result = self.forward_inner(service, endpoints, request).await;
        let label = match &result {
            Ok(resp) if resp.status().is_server_error() => "upstream_error",
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::record_upstream_call(service.as_str(), label, start);
        result
    }

    async fn call_inner<T: DeserializeOwned>(
        &self,
        service: &ServiceName,
        request: UpstreamRequest,
    ) -> Result<T, CallError> {
        let endpoint = self.select(service).await?;
        let max_body = self.settings.max_body_bytes;

        let exchange = async {
            let response = self.send(service, &endpoint, request).await?;
            let status = response.status();
            if !status.is_success() {
                return Err(CallError::UpstreamError {
                    status: status.as_u16(),
                });
            }

            let declared_len = response
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<usize>().ok());
            if declared_len.is_some_and(|len| len > max_body) {
                return Err(CallError::MalformedResponse(format!(
                    "body exceeds {} bytes",
                    max_body
                )));
            }

            let bytes = match Limited::new(response.into_body(), max_body).collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                    return Err(CallError::MalformedResponse(format!(
                        "body exceeds {} bytes",
                        max_body
                    )));
                }
                Err(e) => return Err(CallError::ConnectionError(e.to_string())),
            };

            serde_json::from_slice::<T>(&bytes)
                .map_err(|e| CallError::MalformedResponse(e.to_string()))
        };

        self.bounded(service, &endpoint, exchange).await
    }

    async fn forward_inner(
        &self,
        service: &ServiceName,
        endpoints: &[Endpoint],
        request: UpstreamRequest,
    ) -> Result<Response<Body>, CallError> {
        let endpoint = self.pick(service, endpoints)?;
        let exchange = async {
            let response = self.send(service, &endpoint, request).await?;
            let (parts, body) = response.into_parts();
            Ok(Response::from_parts(parts, Body::new(body)))
        };
        self.bounded(service, &endpoint, exchange).await
    }

    /// Live endpoints for `service`, bounded by the registry timeout.
    pub async fn resolve(&self, service: &ServiceName) -> Result<Vec<Endpoint>, RegistryError> {
        let resolved = tokio::time::timeout(
            self.settings.registry_timeout,
            self.registry.resolve(service),
        )
        .await;

        match resolved {
            Ok(Ok(endpoints)) => Ok(endpoints),
            Ok(Err(RegistryError::UnknownService(name))) => {
                tracing::debug!(service = %service, "Service not registered");
                Err(RegistryError::UnknownService(name))
            }
            Ok(Err(RegistryError::Timeout)) | Err(_) => {
                tracing::warn!(service = %service, "Registry lookup timed out");
                Err(RegistryError::Timeout)
            }
            Ok(Err(e)) => {
                tracing::warn!(service = %service, error = %e, "Registry lookup failed");
                Err(e)
            }
        }
    }

    /// Resolve the service and let the balancer pick an endpoint.
    async fn select(&self, service: &ServiceName) -> Result<Endpoint, CallError> {
        let endpoints = self.resolve(service).await?;
        self.pick(service, &endpoints)
    }

    fn pick(&self, service: &ServiceName, endpoints: &[Endpoint]) -> Result<Endpoint, CallError> {
        match self.balancer.next_endpoint(service, endpoints) {
            Some(endpoint) => Ok(endpoint.clone()),
            None => {
                tracing::debug!(service = %service, "No endpoints available");
                Err(CallError::NoEndpointsAvailable)
            }
        }
    }

    async fn send(
        &self,
        service: &ServiceName,
        endpoint: &Endpoint,
        request: UpstreamRequest,
    ) -> Result<Response<hyper::body::Incoming>, CallError> {
        let uri: Uri = format!("{}{}", endpoint.base_url(), request.path_and_query)
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| CallError::ConnectionError(e.to_string()))?;

        let mut builder = Request::builder().method(request.method).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(request.headers);
        }
        let req = builder
            .body(Body::from(request.body))
            .map_err(|e| CallError::ConnectionError(e.to_string()))?;

        tracing::debug!(service = %service, endpoint = %endpoint, "Sending upstream request");

        self.client.request(req).await.map_err(|e| {
            let message = if e.is_connect() {
                "Upstream connect failed"
            } else {
                "Upstream request failed"
            };
            tracing::warn!(service = %service, endpoint = %endpoint, error = %e, "{}", message);
            CallError::ConnectionError(e.to_string())
        })
    }

    async fn bounded<T, F>(
        &self,
        service: &ServiceName,
        endpoint: &Endpoint,
        exchange: F,
    ) -> Result<T, CallError>
    where
        F: std::future::Future<Output = Result<T, CallError>>,
    {
        match tokio::time::timeout(self.settings.request_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    service = %service,
                    endpoint = %endpoint,
                    timeout = ?self.settings.request_timeout,
                    "Upstream request timed out"
                );
                Err(CallError::Timeout)
            }
        }
    }
}

fn outcome_label<T>(result: &Result<T, CallError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    }
}
