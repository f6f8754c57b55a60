//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::load_balancer::Strategy;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Service registry settings.
    pub registry: RegistryConfig,

    /// Upstream transport settings.
    pub transport: TransportConfig,

    /// Circuit breaker tunables, shared by every breaker.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Order names endpoint settings.
    pub gateway: OrderGatewayConfig,

    /// Pass-through proxy settings.
    pub proxy: ProxyConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin surface settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Which registry implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryKind {
    #[default]
    Static,
    Eureka,
}

/// Service registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub kind: RegistryKind,

    /// Eureka server base URL (kind = "eureka").
    pub eureka_url: String,

    /// Use the instance IP instead of its host name (kind = "eureka").
    pub prefer_ip_address: bool,

    /// Lookup timeout in milliseconds.
    pub timeout_ms: u64,

    /// Cache resolved endpoints for this long; 0 disables the cache.
    pub cache_ttl_ms: u64,

    /// Static instance table: service name → endpoint URLs (kind = "static").
    pub services: BTreeMap<String, Vec<String>>,
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let mut services = BTreeMap::new();
        services.insert(
            "order-service".to_string(),
            vec!["http://127.0.0.1:8081".to_string()],
        );
        Self {
            kind: RegistryKind::Static,
            eureka_url: "http://localhost:8761".to_string(),
            prefer_ip_address: true,
            timeout_ms: 2_000,
            cache_ttl_ms: 0,
            services,
        }
    }
}

/// Upstream transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Total time allowed for one upstream exchange, in milliseconds.
    pub request_timeout_ms: u64,

    /// Largest upstream body accepted, in bytes.
    pub max_body_bytes: usize,

    /// Endpoint selection strategy.
    pub strategy: Strategy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 3_000,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            strategy: Strategy::RoundRobin,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of most recent calls in the sliding window.
    pub window_size: usize,

    /// Calls that must be recorded before the ratio is evaluated.
    pub minimum_calls: usize,

    /// Open when the failure ratio strictly exceeds this (0.0..1.0).
    pub failure_ratio_threshold: f64,

    /// Base open duration in milliseconds.
    pub cooldown_ms: u64,

    /// Growth factor applied after each failed probe.
    pub cooldown_multiplier: f64,

    /// Upper bound for the grown cool-down in milliseconds.
    pub max_cooldown_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            minimum_calls: 20,
            failure_ratio_threshold: 0.5,
            cooldown_ms: 5_000,
            cooldown_multiplier: 2.0,
            max_cooldown_ms: 60_000,
        }
    }
}

/// What `/orders/names` serves when the upstream call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Always an empty list.
    #[default]
    Empty,
    /// Last successful answer if fresh enough, else empty.
    LastKnown,
}

/// Order names endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrderGatewayConfig {
    /// Logical name of the order store service.
    pub order_service: String,

    /// Collection path on the order store.
    pub orders_path: String,

    /// HAL relation holding the orders inside `_embedded`.
    pub collection_rel: String,

    /// Inbound request timeout in seconds.
    pub request_timeout_secs: u64,

    pub fallback: FallbackMode,

    /// Oldest last-known answer still served (fallback = "last_known").
    pub last_known_max_age_secs: u64,
}

impl Default for OrderGatewayConfig {
    fn default() -> Self {
        Self {
            order_service: "order-service".to_string(),
            orders_path: "/orders".to_string(),
            collection_rel: "orders".to_string(),
            request_timeout_secs: 10,
            fallback: FallbackMode::Empty,
            last_known_max_age_secs: 300,
        }
    }
}

/// Pass-through proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Route `/{service}/{*path}` to discovered services.
    pub enabled: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG.
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable `/admin/*` routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
