//! TTL cache in front of a registry client.
//!
//! An entry is served only while it is younger than the TTL, so an instance
//! removed at the source stops being returned within one TTL window.
//! Errors are never cached.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::registry::{Endpoint, RegistryClient, RegistryError, ServiceName};

#[derive(Debug, Clone)]
struct CachedEntry {
    fetched_at: Instant,
    endpoints: Vec<Endpoint>,
}

/// Wraps a [`RegistryClient`] with a bounded-staleness cache.
pub struct CachingRegistry<R> {
    inner: R,
    ttl: Duration,
    entries: DashMap<ServiceName, CachedEntry>,
}

impl<R: RegistryClient> CachingRegistry<R> {
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Drop every cached entry.
    pub fn invalidate_all(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl<R: RegistryClient> RegistryClient for CachingRegistry<R> {
    async fn resolve(&self, service: &ServiceName) -> Result<Vec<Endpoint>, RegistryError> {
        if let Some(entry) = self.entries.get(service) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.endpoints.clone());
            }
        }

        match self.inner.resolve(service).await {
            Ok(endpoints) => {
                self.entries.insert(
                    service.clone(),
                    CachedEntry {
                        fetched_at: Instant::now(),
                        endpoints: endpoints.clone(),
                    },
                );
                Ok(endpoints)
            }
            Err(e) => {
                self.entries.remove(service);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StaticRegistry;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn deregistered_endpoint_expires_within_ttl() {
        let source = Arc::new(StaticRegistry::default());
        let svc = ServiceName::new("order-service").unwrap();
        let ep = Endpoint::parse("http://10.0.0.1:8080").unwrap();
        source.register(svc.clone(), ep.clone());

        let cached = CachingRegistry::new(source.clone(), Duration::from_secs(5));
        assert_eq!(cached.resolve(&svc).await.unwrap(), vec![ep.clone()]);

        source.deregister(&svc, &ep);
        // Still inside the window.
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cached.resolve(&svc).await.unwrap(), vec![ep.clone()]);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cached.resolve(&svc).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let source = Arc::new(StaticRegistry::default());
        let svc = ServiceName::new("late-service").unwrap();
        let cached = CachingRegistry::new(source.clone(), Duration::from_secs(60));

        assert!(cached.resolve(&svc).await.is_err());
        source.register(svc.clone(), Endpoint::parse("http://b:1").unwrap());
        assert_eq!(cached.resolve(&svc).await.unwrap().len(), 1);
    }
}
