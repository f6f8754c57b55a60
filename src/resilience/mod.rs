//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to upstream:
//!     → circuit_breaker.rs (admit, or short-circuit with BreakerOpen)
//!     → transport (bounded by its own timeouts)
//!     → outcome classified and pushed into window.rs
//!     → state.rs decides the transition
//!     → backoff.rs sizes the next cool-down
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries: a failed call is reported, never silently repeated
//! - Circuit breaker prevents cascading failures
//! - State machine is lock- and clock-free; the breaker adds both

pub mod backoff;
pub mod circuit_breaker;
pub mod state;
pub mod window;

pub use circuit_breaker::{
    BreakerKey, BreakerObserver, BreakerPermit, BreakerSnapshot, CircuitBreaker, CircuitBreakers,
    LoggingObserver,
};
pub use state::{BreakerState, Outcome};
