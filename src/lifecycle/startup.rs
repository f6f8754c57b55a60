//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the registry client selected by configuration
//! - Wire registry → load balancer → transport → breakers → gateway
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in dependency order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;

use thiserror::Error;

use crate::config::{GatewayConfig, RegistryKind};
use crate::gateway::OrderGateway;
use crate::registry::{
    static_registry, CachingRegistry, EurekaRegistry, InvalidServiceName, RegistryClient,
    StaticRegistry,
};
use crate::resilience::CircuitBreakers;
use crate::transport::{LoadBalancedTransport, TransportSettings};

/// Error raised while assembling the gateway.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid order service name: {0}")]
    OrderService(#[from] InvalidServiceName),
}

/// Every long-lived subsystem, wired together.
#[derive(Clone)]
pub struct Components {
    pub registry: Arc<dyn RegistryClient>,
    /// Present when the registry is the in-process table, for hot reload.
    pub static_registry: Option<Arc<StaticRegistry>>,
    /// Present when lookups are cached; flushed on reload.
    pub registry_cache: Option<Arc<CachingRegistry<Arc<dyn RegistryClient>>>>,
    pub transport: Arc<LoadBalancedTransport>,
    pub breakers: Arc<CircuitBreakers>,
    pub gateway: Arc<OrderGateway>,
}

impl Components {
    /// Build every subsystem from configuration.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, StartupError> {
        let registry_config = &config.registry;
        let (base, static_registry): (Arc<dyn RegistryClient>, _) = match registry_config.kind {
            RegistryKind::Static => {
                let registry = Arc::new(StaticRegistry::from_urls(registry_config.services.iter()));
                (registry.clone() as Arc<dyn RegistryClient>, Some(registry))
            }
            RegistryKind::Eureka => {
                tracing::info!(url = %registry_config.eureka_url, "Using Eureka registry");
                let registry = EurekaRegistry::new(
                    registry_config.eureka_url.clone(),
                    registry_config.prefer_ip_address,
                    registry_config.timeout(),
                );
                (Arc::new(registry), None)
            }
        };

        let (registry, registry_cache): (Arc<dyn RegistryClient>, _) =
            if registry_config.cache_ttl_ms > 0 {
                tracing::info!(ttl = ?registry_config.cache_ttl(), "Registry cache enabled");
                let cache = Arc::new(CachingRegistry::new(base, registry_config.cache_ttl()));
                (cache.clone() as Arc<dyn RegistryClient>, Some(cache))
            } else {
                (base, None)
            };

        let mut components = Self::with_registry(config, registry)?;
        components.static_registry = static_registry;
        components.registry_cache = registry_cache;
        Ok(components)
    }

    /// Build every subsystem around a caller-supplied registry.
    pub fn with_registry(
        config: &GatewayConfig,
        registry: Arc<dyn RegistryClient>,
    ) -> Result<Self, StartupError> {
        let transport = Arc::new(LoadBalancedTransport::new(
            registry.clone(),
            config.transport.strategy.build(),
            TransportSettings::from_config(&config.transport, config.registry.timeout()),
        ));
        let breakers = Arc::new(CircuitBreakers::new(config.circuit_breaker.clone()));
        let gateway = Arc::new(OrderGateway::new(transport.clone(), &breakers, &config.gateway)?);

        tracing::info!(
            order_service = %config.gateway.order_service,
            strategy = ?config.transport.strategy,
            request_timeout_ms = config.transport.request_timeout_ms,
            window_size = config.circuit_breaker.window_size,
            failure_ratio_threshold = config.circuit_breaker.failure_ratio_threshold,
            "Gateway components initialized"
        );

        Ok(Self {
            registry,
            static_registry: None,
            registry_cache: None,
            transport,
            breakers,
            gateway,
        })
    }

    /// Apply a reloaded configuration. Only the static registry table is
    /// hot-swappable; other changes need a restart.
    pub fn apply_reload(&self, config: &GatewayConfig) {
        match (&self.static_registry, config.registry.kind) {
            (Some(registry), RegistryKind::Static) => {
                registry.replace(static_registry::build_table(config.registry.services.iter()));
            }
            _ => tracing::warn!(
                "Config reloaded; only static registry entries apply without restart"
            ),
        }
        if let Some(cache) = &self.registry_cache {
            cache.invalidate_all();
        }
    }
}
