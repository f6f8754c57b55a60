//! Order store payload shapes.
//!
//! The order store serves a Spring Data REST (HAL) collection:
//!
//! ```json
//! {"_embedded":{"orders":[{"orderName":"kamel"},{"orderName":"karim"}]},
//!  "_links":{"self":{"href":"..."}},
//!  "page":{"size":20,"totalElements":2,"totalPages":1,"number":0}}
//! ```
//!
//! Only the embedded resources matter here; links and paging are ignored.

use std::collections::HashMap;

use serde::Deserialize;

use crate::transport::CallError;

/// One order resource. Extra fields (`id`, `_links`) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResource {
    pub order_name: String,
}

/// A HAL collection whose embedded relations hold order resources.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderCollection {
    #[serde(rename = "_embedded", default)]
    embedded: HashMap<String, serde_json::Value>,
}

impl OrderCollection {
    /// Order names under `rel`, in document order. A missing relation is an
    /// empty collection (HAL omits `_embedded` for empty pages); other
    /// relations are never inspected.
    pub fn into_names(mut self, rel: &str) -> Result<Vec<String>, CallError> {
        let Some(resources) = self.embedded.remove(rel) else {
            return Ok(Vec::new());
        };
        let orders: Vec<OrderResource> = serde_json::from_value(resources)
            .map_err(|e| CallError::MalformedResponse(format!("_embedded.{}: {}", rel, e)))?;
        Ok(orders.into_iter().map(|order| order.order_name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_collection(body: &[u8]) -> Result<OrderCollection, CallError> {
        serde_json::from_slice(body).map_err(|e| CallError::MalformedResponse(e.to_string()))
    }

    #[test]
    fn extracts_names_in_order() {
        let body = br#"{"_embedded":{"orders":[
            {"orderName":"kamel","_links":{"self":{"href":"http://x/orders/1"}}},
            {"orderName":"karim"},
            {"orderName":"joe"},
            {"orderName":"jane"}
        ]},"_links":{"self":{"href":"http://x/orders"}},"page":{"size":20,"number":0}}"#;

        let names = parse_collection(body).unwrap().into_names("orders").unwrap();
        assert_eq!(names, vec!["kamel", "karim", "joe", "jane"]);
    }

    #[test]
    fn missing_embedded_is_empty() {
        let names = parse_collection(br#"{"_links":{}}"#)
            .unwrap()
            .into_names("orders")
            .unwrap();
        assert!(names.is_empty());

        let names = parse_collection(br#"{"_embedded":{"other":[{"x":1}]}}"#)
            .unwrap()
            .into_names("orders")
            .unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn order_without_name_is_malformed() {
        let err = parse_collection(br#"{"_embedded":{"orders":[{"id":1}]}}"#)
            .unwrap()
            .into_names("orders")
            .unwrap_err();
        assert!(matches!(err, CallError::MalformedResponse(_)));
    }

    #[test]
    fn non_object_is_malformed() {
        assert!(matches!(
            parse_collection(b"[\"kamel\"]"),
            Err(CallError::MalformedResponse(_))
        ));
    }
}
