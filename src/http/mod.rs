//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID stamped and propagated)
//!     → /orders/names       → gateway (fallback on failure)
//!     → /{service}/{*path}  → proxy.rs (breaker + transport, pass-through)
//!     → Send to client
//! ```

pub mod proxy;
pub mod request;
pub mod server;

pub use request::{request_id, MakeRequestUuid, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
