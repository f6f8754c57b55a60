//! Order names operation.
//!
//! # Responsibilities
//! - Fetch the order collection through breaker + transport
//! - Extract order names in document order
//! - Bound the whole call by the names deadline inside the breaker
//! - Reduce every failure to the fallback value, here and nowhere else

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use axum::http::{header, HeaderValue};
use tokio::time::Instant;

use crate::config::{FallbackMode, OrderGatewayConfig};
use crate::gateway::orders::OrderCollection;
use crate::observability::metrics;
use crate::registry::{InvalidServiceName, ServiceName};
use crate::resilience::{CircuitBreaker, CircuitBreakers};
use crate::transport::{CallError, LoadBalancedTransport, UpstreamRequest};

/// Breaker operation name for the order names call.
pub const NAMES_OPERATION: &str = "names";

/// What to answer with when the upstream call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Always an empty list.
    Empty,
    /// The last successful answer while younger than `max_age`, else empty.
    LastKnown { max_age: Duration },
}

impl FallbackPolicy {
    pub fn from_config(config: &OrderGatewayConfig) -> Self {
        match config.fallback {
            FallbackMode::Empty => FallbackPolicy::Empty,
            FallbackMode::LastKnown => FallbackPolicy::LastKnown {
                max_age: Duration::from_secs(config.last_known_max_age_secs),
            },
        }
    }
}

#[derive(Debug)]
struct LastKnown {
    names: Vec<String>,
    at: Instant,
}

/// Gateway in front of the order store's collection endpoint.
pub struct OrderGateway {
    transport: Arc<LoadBalancedTransport>,
    breaker: Arc<CircuitBreaker>,
    service: ServiceName,
    orders_path: String,
    collection_rel: String,
    policy: FallbackPolicy,
    deadline: Duration,
    last_known: ArcSwapOption<LastKnown>,
}

impl OrderGateway {
    pub fn new(
        transport: Arc<LoadBalancedTransport>,
        breakers: &CircuitBreakers,
        config: &OrderGatewayConfig,
    ) -> Result<Self, InvalidServiceName> {
        let service = ServiceName::new(&config.order_service)?;
        let breaker = breakers.get(&service, NAMES_OPERATION);
        Ok(Self {
            transport,
            breaker,
            service,
            orders_path: config.orders_path.clone(),
            collection_rel: config.collection_rel.clone(),
            policy: FallbackPolicy::from_config(config),
            deadline: Duration::from_secs(config.request_timeout_secs),
            last_known: ArcSwapOption::empty(),
        })
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Order names, or the fallback if they cannot be fetched. Never fails.
    pub async fn order_names(&self) -> Vec<String> {
        match self.try_order_names().await {
            Ok(names) => {
                if let FallbackPolicy::LastKnown { .. } = self.policy {
                    self.last_known.store(Some(Arc::new(LastKnown {
                        names: names.clone(),
                        at: Instant::now(),
                    })));
                }
                names
            }
            Err(e) => {
                tracing::warn!(
                    service = %self.service,
                    reason = e.kind(),
                    error = %e,
                    "Order names unavailable, serving fallback"
                );
                metrics::record_fallback(e.kind());
                self.fallback()
            }
        }
    }

    /// Order names with the failure reason preserved.
    pub async fn try_order_names(&self) -> Result<Vec<String>, CallError> {
        let mut request = UpstreamRequest::get(self.orders_path.as_str());
        request.headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/hal+json, application/json"),
        );

        self.breaker
            .call(|| async {
                let fetch = async {
                    let collection: OrderCollection =
                        self.transport.call(&self.service, request).await?;
                    collection.into_names(&self.collection_rel)
                };
                match tokio::time::timeout(self.deadline, fetch).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(
                            service = %self.service,
                            deadline = ?self.deadline,
                            "Order names deadline exceeded"
                        );
                        Err(CallError::Timeout)
                    }
                }
            })
            .await
    }

    fn fallback(&self) -> Vec<String> {
        match self.policy {
            FallbackPolicy::Empty => Vec::new(),
            FallbackPolicy::LastKnown { max_age } => match self.last_known.load_full() {
                Some(last) if last.at.elapsed() <= max_age => last.names.clone(),
                _ => Vec::new(),
            },
        }
    }
}
