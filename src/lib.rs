//! Order gateway library.
//!
//! A front door for the order service: discovers instances through a
//! registry, spreads calls across them, guards each operation with a circuit
//! breaker, and answers `GET /orders/names` with an empty list whenever the
//! order store cannot.

pub mod admin;
pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod transport;

pub use config::schema::GatewayConfig;
pub use gateway::OrderGateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
