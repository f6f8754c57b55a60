//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! ServiceName → registry resolve → [Endpoint; K]
//!     → Apply load balancing strategy:
//!         - round_robin.rs (rotate through endpoints, cursor per service)
//!         - random.rs (uniform pick)
//!     → one Endpoint for this call
//! ```
//!
//! # Design Decisions
//! - Strategies never see registry state, only the resolved slice
//! - Selection state is keyed by ServiceName and shared process-wide
//! - Empty slice always yields None; the caller decides what that means

pub mod random;
pub mod round_robin;

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::registry::{Endpoint, ServiceName};

pub use random::RandomChoice;
pub use round_robin::RoundRobin;

/// Pluggable endpoint selection strategy.
pub trait LoadBalancer: Send + Sync + Debug {
    /// Pick one endpoint for the next call to `service`.
    fn next_endpoint<'a>(
        &self,
        service: &ServiceName,
        endpoints: &'a [Endpoint],
    ) -> Option<&'a Endpoint>;
}

/// Strategy selector used in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    Random,
}

impl Strategy {
    pub fn build(self) -> Arc<dyn LoadBalancer> {
        match self {
            Strategy::RoundRobin => Arc::new(RoundRobin::new()),
            Strategy::Random => Arc::new(RandomChoice),
        }
    }
}
