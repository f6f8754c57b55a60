//! Round-robin load balancing strategy.

use dashmap::DashMap;

use crate::load_balancer::LoadBalancer;
use crate::registry::{Endpoint, ServiceName};

#[derive(Debug, Clone, Copy)]
struct Cursor {
    /// Size of the endpoint set this cursor was built for.
    len: usize,
    next: usize,
}

/// Round-robin selector.
/// Keeps one cursor per service; a cursor restarts at zero whenever the
/// resolved set changes size.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursors: DashMap<ServiceName, Cursor>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_endpoint<'a>(
        &self,
        service: &ServiceName,
        endpoints: &'a [Endpoint],
    ) -> Option<&'a Endpoint> {
        let len = endpoints.len();
        if len == 0 {
            return None;
        }

        // The entry guard serialises concurrent callers for the same service.
        let mut cursor = self
            .cursors
            .entry(service.clone())
            .or_insert(Cursor { len, next: 0 });
        if cursor.len != len {
            tracing::debug!(
                service = %service,
                old = cursor.len,
                new = len,
                "Endpoint set changed size, resetting cursor"
            );
            *cursor = Cursor { len, next: 0 };
        }
        let index = cursor.next % len;
        cursor.next = cursor.next.wrapping_add(1);

        endpoints.get(index)
    }
}
