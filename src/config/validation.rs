//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ratios in range)
//! - Check that configured addresses and endpoint URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{GatewayConfig, RegistryKind};
use crate::registry::{Endpoint, ServiceName};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("circuit_breaker.minimum_calls ({minimum}) exceeds window_size ({window})")]
    MinimumCallsExceedWindow { minimum: usize, window: usize },

    #[error("circuit_breaker.max_cooldown_ms ({max}) is below cooldown_ms ({base})")]
    CooldownBounds { base: u64, max: u64 },

    #[error("registry.services: empty service name")]
    EmptyServiceName,

    #[error("registry.services.{service}: {reason}")]
    InvalidEndpoint { service: String, reason: String },

    #[error("registry.eureka_url: invalid url '{0}'")]
    InvalidEurekaUrl(String),

    #[error("gateway.order_service must not be empty")]
    EmptyOrderService,

    #[error("gateway.orders_path must start with '/', got '{0}'")]
    InvalidOrdersPath(String),

    #[error(
        "gateway.request_timeout_secs ({deadline_ms} ms) must exceed \
         registry.timeout_ms + transport.request_timeout_ms ({budget_ms} ms)"
    )]
    DeadlineBelowCallBudget { deadline_ms: u64, budget_ms: u64 },

    #[error("circuit_breaker.failure_ratio_threshold must be within 0.0..1.0, got {0}")]
    UnreachableThreshold(f64),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    let registry = &config.registry;
    check_nonzero(&mut errors, "registry.timeout_ms", registry.timeout_ms);
    match registry.kind {
        RegistryKind::Static => {
            for (name, urls) in &registry.services {
                if ServiceName::new(name).is_err() {
                    errors.push(ValidationError::EmptyServiceName);
                    continue;
                }
                for url in urls {
                    if let Err(e) = Endpoint::parse(url) {
                        errors.push(ValidationError::InvalidEndpoint {
                            service: name.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
        RegistryKind::Eureka => {
            if url::Url::parse(&registry.eureka_url).is_err() {
                errors.push(ValidationError::InvalidEurekaUrl(registry.eureka_url.clone()));
            }
        }
    }

    let transport = &config.transport;
    check_nonzero(&mut errors, "transport.request_timeout_ms", transport.request_timeout_ms);
    check_nonzero(&mut errors, "transport.max_body_bytes", transport.max_body_bytes as u64);

    let cb = &config.circuit_breaker;
    check_nonzero(&mut errors, "circuit_breaker.window_size", cb.window_size as u64);
    check_nonzero(&mut errors, "circuit_breaker.minimum_calls", cb.minimum_calls as u64);
    check_nonzero(&mut errors, "circuit_breaker.cooldown_ms", cb.cooldown_ms);
    if cb.window_size > 0 && cb.minimum_calls > cb.window_size {
        errors.push(ValidationError::MinimumCallsExceedWindow {
            minimum: cb.minimum_calls,
            window: cb.window_size,
        });
    }
    // The breaker trips on ratio > threshold, so 1.0 could never trip.
    if !(0.0..1.0).contains(&cb.failure_ratio_threshold) {
        errors.push(ValidationError::UnreachableThreshold(cb.failure_ratio_threshold));
    }
    check_range(
        &mut errors,
        "circuit_breaker.cooldown_multiplier",
        cb.cooldown_multiplier,
        1.0,
        100.0,
    );
    if cb.max_cooldown_ms < cb.cooldown_ms {
        errors.push(ValidationError::CooldownBounds {
            base: cb.cooldown_ms,
            max: cb.max_cooldown_ms,
        });
    }

    let gateway = &config.gateway;
    if ServiceName::new(&gateway.order_service).is_err() {
        errors.push(ValidationError::EmptyOrderService);
    }
    if !gateway.orders_path.starts_with('/') {
        errors.push(ValidationError::InvalidOrdersPath(gateway.orders_path.clone()));
    }
    check_nonzero(&mut errors, "gateway.request_timeout_secs", gateway.request_timeout_secs);

    // A call still running at the names deadline would be cut off before it
    // could report its own timeout.
    let budget_ms = registry.timeout_ms.saturating_add(transport.request_timeout_ms);
    let deadline_ms = gateway.request_timeout_secs.saturating_mul(1_000);
    if gateway.request_timeout_secs > 0 && budget_ms >= deadline_ms {
        errors.push(ValidationError::DeadlineBelowCallBudget {
            deadline_ms,
            budget_ms,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_nonzero(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::Zero { field });
    }
}

fn check_range(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) {
    if !(min..=max).contains(&value) {
        errors.push(ValidationError::OutOfRange { field, value, min, max });
    }
}
