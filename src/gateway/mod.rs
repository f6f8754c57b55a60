//! Order gateway subsystem.
//!
//! # Data Flow
//! ```text
//! GET /orders/names
//!     → handler.rs (OrderGateway::order_names)
//!     → circuit breaker ("order-service", "names")
//!     → transport GET /orders on one order-service instance
//!     → orders.rs (HAL collection → order names)
//!     → names, or the fallback on any failure
//! ```
//!
//! # Design Decisions
//! - Callers never observe upstream unavailability as an error
//! - The error-to-fallback reduction happens once, in `order_names`

pub mod handler;
pub mod orders;

pub use handler::{FallbackPolicy, OrderGateway, NAMES_OPERATION};
pub use orders::{OrderCollection, OrderResource};
