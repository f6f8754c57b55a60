//! In-process registry backed by configuration.
//!
//! Readers load an immutable snapshot; writers publish a new one with
//! `rcu`, so lookups never block on updates.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::registry::{Endpoint, RegistryClient, RegistryError, ServiceName};

type Table = HashMap<ServiceName, Vec<Endpoint>>;

/// Registry whose instance table lives in memory.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    table: ArcSwap<Table>,
}

impl StaticRegistry {
    pub fn new(table: HashMap<ServiceName, Vec<Endpoint>>) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    /// Build from `name -> [url, ...]` pairs, skipping entries that fail to parse.
    pub fn from_urls<'a, I, U>(services: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, U)>,
        U: IntoIterator<Item = &'a String>,
    {
        Self::new(build_table(services))
    }

    /// Replace the whole table (config reload).
    pub fn replace(&self, table: HashMap<ServiceName, Vec<Endpoint>>) {
        let services = table.len();
        self.table.store(Arc::new(table));
        tracing::info!(services, "Static registry table replaced");
    }

    /// Add an instance. Registering the same endpoint twice is a no-op.
    pub fn register(&self, service: ServiceName, endpoint: Endpoint) {
        self.table.rcu(|current| {
            let mut next = Table::clone(current);
            let instances = next.entry(service.clone()).or_default();
            if !instances.contains(&endpoint) {
                instances.push(endpoint.clone());
            }
            next
        });
        tracing::debug!(service = %service, endpoint = %endpoint, "Instance registered");
    }

    /// Remove an instance. The service stays registered even with zero instances.
    pub fn deregister(&self, service: &ServiceName, endpoint: &Endpoint) {
        self.table.rcu(|current| {
            let mut next = Table::clone(current);
            if let Some(instances) = next.get_mut(service) {
                instances.retain(|e| e != endpoint);
            }
            next
        });
        tracing::debug!(service = %service, endpoint = %endpoint, "Instance deregistered");
    }
}

#[async_trait]
impl RegistryClient for StaticRegistry {
    async fn resolve(&self, service: &ServiceName) -> Result<Vec<Endpoint>, RegistryError> {
        self.table
            .load()
            .get(service)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownService(service.clone()))
    }
}

/// Parse a configured `name -> urls` map into a registry table.
pub fn build_table<'a, I, U>(services: I) -> Table
where
    I: IntoIterator<Item = (&'a String, U)>,
    U: IntoIterator<Item = &'a String>,
{
    let mut table = Table::new();
    for (name, urls) in services {
        let service = match ServiceName::new(name) {
            Ok(s) => s,
            Err(_) => {
                tracing::warn!("Skipping registry entry with empty service name");
                continue;
            }
        };
        let endpoints = table.entry(service).or_default();
        for url in urls {
            match Endpoint::parse(url) {
                Ok(ep) => endpoints.push(ep),
                Err(e) => tracing::warn!(
                    service = %name,
                    error = %e,
                    "Invalid endpoint in registry config"
                ),
            }
        }
    }
    table
}
