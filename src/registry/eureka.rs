//! Eureka REST registry client.
//!
//! # Responsibilities
//! - Look up `GET {base}/eureka/apps/{APP}` with a JSON accept header
//! - Keep only instances reported `UP`
//! - Translate Eureka's instance shape into [`Endpoint`]s
//!
//! Eureka serialises a single-instance application with `instance` as an
//! object instead of an array; both encodings are accepted.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::Deserialize;

use crate::registry::{Endpoint, RegistryClient, RegistryError, Scheme, ServiceName};

const MAX_REGISTRY_BODY: usize = 4 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct ApplicationEnvelope {
    application: Application,
}

#[derive(Debug, Deserialize)]
struct Application {
    #[serde(default)]
    instance: Option<OneOrMany<Instance>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(t) => vec![t],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instance {
    host_name: Option<String>,
    ip_addr: Option<String>,
    status: String,
    port: Option<PortInfo>,
    secure_port: Option<PortInfo>,
}

#[derive(Debug, Deserialize)]
struct PortInfo {
    #[serde(rename = "$")]
    port: u16,
    #[serde(rename = "@enabled", default)]
    enabled: Option<String>,
}

impl PortInfo {
    fn is_enabled(&self) -> bool {
        self.enabled.as_deref() == Some("true")
    }
}

/// Registry client speaking the Eureka REST protocol.
#[derive(Clone)]
pub struct EurekaRegistry {
    base_url: String,
    prefer_ip_address: bool,
    timeout: Duration,
    client: Client<HttpConnector, Body>,
}

impl EurekaRegistry {
    pub fn new(base_url: impl Into<String>, prefer_ip_address: bool, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            prefer_ip_address,
            timeout,
            client,
        }
    }

    fn app_url(&self, service: &ServiceName) -> String {
        format!(
            "{}/eureka/apps/{}",
            self.base_url,
            service.as_str().to_uppercase()
        )
    }

    fn to_endpoint(&self, instance: Instance) -> Option<Endpoint> {
        let host = if self.prefer_ip_address {
            instance.ip_addr.or(instance.host_name)
        } else {
            instance.host_name.or(instance.ip_addr)
        }?;

        match (instance.secure_port, instance.port) {
            (Some(secure), _) if secure.is_enabled() => {
                Some(Endpoint::new(Scheme::Https, host, secure.port))
            }
            (_, Some(plain)) => Some(Endpoint::new(Scheme::Http, host, plain.port)),
            _ => None,
        }
    }

    /// Decode an application document into live endpoints.
    fn parse_application(&self, body: &[u8]) -> Result<Vec<Endpoint>, RegistryError> {
        let envelope: ApplicationEnvelope = serde_json::from_slice(body)
            .map_err(|e| RegistryError::Malformed(e.to_string()))?;

        let instances = envelope
            .application
            .instance
            .map(OneOrMany::into_vec)
            .unwrap_or_default();

        Ok(instances
            .into_iter()
            .filter(|i| i.status.eq_ignore_ascii_case("UP"))
            .filter_map(|i| self.to_endpoint(i))
            .collect())
    }

    async fn fetch(&self, service: &ServiceName) -> Result<Vec<Endpoint>, RegistryError> {
        let request = Request::builder()
            .method("GET")
            .uri(self.app_url(service))
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, "order-gateway-registry")
            .body(Body::empty())
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::UnknownService(service.clone()));
        }
        if !status.is_success() {
            return Err(RegistryError::Unavailable(format!("registry returned {}", status)));
        }

        let bytes = axum::body::to_bytes(Body::new(response.into_body()), MAX_REGISTRY_BODY)
            .await
            .map_err(|e| RegistryError::Malformed(e.to_string()))?;

        self.parse_application(&bytes)
    }
}

#[async_trait]
impl RegistryClient for EurekaRegistry {
    async fn resolve(&self, service: &ServiceName) -> Result<Vec<Endpoint>, RegistryError> {
        match tokio::time::timeout(self.timeout, self.fetch(service)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    service = %service,
                    timeout = ?self.timeout,
                    "Eureka lookup timed out"
                );
                Err(RegistryError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(prefer_ip: bool) -> EurekaRegistry {
        EurekaRegistry::new("http://eureka:8761/", prefer_ip, Duration::from_secs(1))
    }

    #[test]
    fn app_url_uppercases_name() {
        let r = registry(true);
        let svc = ServiceName::new("order-service").unwrap();
        assert_eq!(r.app_url(&svc), "http://eureka:8761/eureka/apps/ORDER-SERVICE");
    }

    #[tokio::test]
    async fn parses_instance_array_and_filters_down() {
        let body = br#"{"application":{"name":"ORDER-SERVICE","instance":[
            {"hostName":"node-a","ipAddr":"10.0.0.1","status":"UP",
             "port":{"$":8080,"@enabled":"true"},"securePort":{"$":8443,"@enabled":"false"}},
            {"hostName":"node-b","ipAddr":"10.0.0.2","status":"DOWN",
             "port":{"$":8080,"@enabled":"true"}},
            {"hostName":"node-c","ipAddr":"10.0.0.3","status":"UP",
             "port":{"$":8080,"@enabled":"true"},"securePort":{"$":8443,"@enabled":"true"}}
        ]}}"#;

        let eps = registry(true).parse_application(body).unwrap();
        assert_eq!(
            eps,
            vec![
                Endpoint::new(Scheme::Http, "10.0.0.1", 8080),
                Endpoint::new(Scheme::Https, "10.0.0.3", 8443),
            ]
        );

        let eps = registry(false).parse_application(body).unwrap();
        assert_eq!(eps[0].host, "node-a");
    }

    #[tokio::test]
    async fn parses_single_instance_object() {
        let body = br#"{"application":{"name":"ORDER-SERVICE","instance":
            {"hostName":"node-a","ipAddr":"10.0.0.1","status":"UP",
             "port":{"$":9000,"@enabled":"true"}}}}"#;
        let eps = registry(true).parse_application(body).unwrap();
        assert_eq!(eps, vec![Endpoint::new(Scheme::Http, "10.0.0.1", 9000)]);
    }

    #[tokio::test]
    async fn no_instances_is_empty_not_error() {
        let body = br#"{"application":{"name":"ORDER-SERVICE"}}"#;
        assert!(registry(true).parse_application(body).unwrap().is_empty());
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        assert!(matches!(
            registry(true).parse_application(b"<xml/>"),
            Err(RegistryError::Malformed(_))
        ));
    }
}
