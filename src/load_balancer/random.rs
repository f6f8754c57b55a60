//! Uniform random load balancing strategy.

use crate::load_balancer::LoadBalancer;
use crate::registry::{Endpoint, ServiceName};

/// Picks an endpoint uniformly at random. Stateless.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomChoice;

impl LoadBalancer for RandomChoice {
    fn next_endpoint<'a>(
        &self,
        _service: &ServiceName,
        endpoints: &'a [Endpoint],
    ) -> Option<&'a Endpoint> {
        if endpoints.is_empty() {
            return None;
        }
        endpoints.get(fastrand::usize(..endpoints.len()))
    }
}
