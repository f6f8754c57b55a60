//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID)
//! - Serve the order names operation with its fallback
//! - Expose registry introspection and the pass-through proxy
//! - Apply hot-reloaded configuration while running

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin;
use crate::config::GatewayConfig;
use crate::gateway::OrderGateway;
use crate::http::proxy::proxy_handler;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::lifecycle::startup::{Components, StartupError};
use crate::observability::metrics;
use crate::registry::{RegistryClient, RegistryError, ServiceName};
use crate::resilience::CircuitBreakers;
use crate::transport::LoadBalancedTransport;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<OrderGateway>,
    pub transport: Arc<LoadBalancedTransport>,
    pub breakers: Arc<CircuitBreakers>,
    pub registry: Arc<dyn RegistryClient>,
    pub config: Arc<GatewayConfig>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: Arc<GatewayConfig>,
    components: Components,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, StartupError> {
        let components = Components::from_config(&config)?;
        Ok(Self::with_components(config, components))
    }

    /// Create a server around already-built components.
    pub fn with_components(config: GatewayConfig, components: Components) -> Self {
        let config = Arc::new(config);
        let state = AppState {
            gateway: components.gateway.clone(),
            transport: components.transport.clone(),
            breakers: components.breakers.clone(),
            registry: components.registry.clone(),
            config: config.clone(),
        };
        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            components,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/orders/names", get(order_names_handler))
            .route("/service-instances/{name}", get(service_instances_handler))
            .route("/health", get(health_handler));

        if config.proxy.enabled {
            router = router.route("/{service}/{*path}", any(proxy_handler));
        }

        if config.admin.enabled {
            router = router.merge(admin::setup_admin_router(state.clone()));
        }

        // The outer bound sits past the names deadline so that route always
        // answers with its fallback rather than a timeout status.
        let outer_timeout = names_deadline(config) + Duration::from_secs(1);

        router
            .with_state(state)
            .layer(TimeoutLayer::new(outer_timeout))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id(request.headers()),
                )
            }))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// The router, for serving or driving directly in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Get the wired subsystems.
    pub fn components(&self) -> &Components {
        &self.components
    }

    /// Run the server until `shutdown` fires, applying config updates as
    /// they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let components = self.components.clone();
        let reload = tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                components.apply_reload(&new_config);
                tracing::info!("Configuration reloaded");
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reload.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn names_deadline(config: &GatewayConfig) -> Duration {
    Duration::from_secs(config.gateway.request_timeout_secs)
}

/// `GET /orders/names`. Always 200.
async fn order_names_handler(State(state): State<AppState>) -> Json<Vec<String>> {
    let start = Instant::now();
    let names = state.gateway.order_names().await;
    metrics::record_request("orders_names", StatusCode::OK.as_u16(), start);
    Json(names)
}

/// `GET /service-instances/{name}`: the registry's current view.
async fn service_instances_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let start = Instant::now();

    let response = match ServiceName::new(&name) {
        Err(_) => (StatusCode::NOT_FOUND, "Unknown service").into_response(),
        Ok(service) => {
            let lookup = tokio::time::timeout(
                state.config.registry.timeout(),
                state.registry.resolve(&service),
            );
            match lookup.await {
                Ok(Ok(endpoints)) => Json(endpoints).into_response(),
                Ok(Err(RegistryError::UnknownService(_))) => {
                    (StatusCode::NOT_FOUND, "Unknown service").into_response()
                }
                Ok(Err(e)) => {
                    tracing::warn!(service = %service, error = %e, "Registry lookup failed");
                    (StatusCode::SERVICE_UNAVAILABLE, "Registry unavailable").into_response()
                }
                Err(_) => {
                    tracing::warn!(service = %service, "Registry lookup timed out");
                    (StatusCode::SERVICE_UNAVAILABLE, "Registry unavailable").into_response()
                }
            }
        }
    };

    metrics::record_request("service_instances", response.status().as_u16(), start);
    response
}

async fn health_handler() -> &'static str {
    "OK"
}
