//! Pass-through proxy and admin surface tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod common;

use common::{client, config_with_backends, fetch_names, hal_orders, start_gateway, MockRequest};

#[tokio::test]
async fn test_proxy_forwards_method_path_and_body() {
    let seen: Arc<Mutex<Option<MockRequest>>> = Arc::new(Mutex::new(None));
    let s = seen.clone();
    let backend = common::start_programmable_backend(move |request| {
        *s.lock().unwrap() = Some(request);
        async { (201, r#"{"id":7}"#.to_string()) }
    })
    .await;

    let gateway = start_gateway(config_with_backends(&[backend])).await;
    let res = client()
        .post(gateway.url("/order-service/orders?source=test"))
        .header("content-type", "application/json")
        .header("x-request-id", "proxy-req-1")
        .body(r#"{"orderName":"joe"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 201);
    assert_eq!(res.headers().get("x-request-id").unwrap(), "proxy-req-1");
    assert_eq!(res.text().await.unwrap(), r#"{"id":7}"#);

    let request = seen.lock().unwrap().clone().unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/orders?source=test");
    assert_eq!(request.body, br#"{"orderName":"joe"}"#);
    assert_eq!(request.header("x-request-id"), Some("proxy-req-1"));
    assert_eq!(request.header("content-type"), Some("application/json"));
}

#[tokio::test]
async fn test_proxy_passes_upstream_errors_through() {
    let backend = common::start_programmable_backend(|_| async { (400, "bad".to_string()) }).await;
    let gateway = start_gateway(config_with_backends(&[backend])).await;

    let res = client()
        .get(gateway.url("/order-service/orders/xyz"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    assert_eq!(res.text().await.unwrap(), "bad");
}

#[tokio::test]
async fn test_proxy_failure_statuses() {
    let client = client();

    let gateway = start_gateway(config_with_backends(&[])).await;
    let res = client.get(gateway.url("/order-service/orders")).send().await.unwrap();
    assert_eq!(res.status(), 503);

    let dead = common::unused_addr().await;
    let gateway = start_gateway(config_with_backends(&[dead])).await;
    let res = client.get(gateway.url("/order-service/orders")).send().await.unwrap();
    assert_eq!(res.status(), 502);

    let slow = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        (200, "{}".to_string())
    })
    .await;
    let mut config = config_with_backends(&[slow]);
    config.transport.request_timeout_ms = 50;
    let gateway = start_gateway(config).await;
    let res = client.get(gateway.url("/order-service/orders")).send().await.unwrap();
    assert_eq!(res.status(), 504);
}

#[tokio::test]
async fn test_proxy_breaker_is_separate_from_names() {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let backend = common::start_programmable_backend(move |request| {
        h.fetch_add(1, Ordering::SeqCst);
        async move {
            if request.path.starts_with("/broken") {
                (500, "boom".to_string())
            } else {
                (200, hal_orders(&["kamel"]))
            }
        }
    })
    .await;

    let mut config = config_with_backends(&[backend]);
    config.circuit_breaker.window_size = 4;
    config.circuit_breaker.minimum_calls = 4;
    config.circuit_breaker.cooldown_ms = 60_000;
    let gateway = start_gateway(config).await;
    let client = client();

    for _ in 0..4 {
        let res = client.get(gateway.url("/order-service/broken")).send().await.unwrap();
        assert_eq!(res.status(), 500);
    }
    let res = client.get(gateway.url("/order-service/broken")).send().await.unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(hits.load(Ordering::SeqCst), 4);

    assert_eq!(fetch_names(&client, &gateway).await, vec!["kamel"]);
}

#[tokio::test]
async fn test_admin_requires_bearer_key() {
    let mut config = config_with_backends(&[]);
    config.admin.enabled = true;
    config.admin.api_key = "secret".to_string();
    let gateway = start_gateway(config).await;
    let client = client();

    let res = client.get(gateway.url("/admin/status")).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .get(gateway.url("/admin/status"))
        .header("authorization", "Bearer wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .get(gateway.url("/admin/status"))
        .header("authorization", "Bearer secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let status: serde_json::Value = res.json().await.unwrap();
    assert_eq!(status["status"], "operational");
}

#[tokio::test]
async fn test_admin_breaker_snapshot_and_reset() {
    let mut config = config_with_backends(&[]);
    config.admin.enabled = true;
    config.admin.api_key = "secret".to_string();
    config.circuit_breaker.window_size = 2;
    config.circuit_breaker.minimum_calls = 2;
    config.circuit_breaker.cooldown_ms = 60_000;
    let gateway = start_gateway(config).await;
    let client = client();

    for _ in 0..2 {
        assert!(fetch_names(&client, &gateway).await.is_empty());
    }

    let breakers: Vec<serde_json::Value> = client
        .get(gateway.url("/admin/breakers"))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(breakers.len(), 1);
    assert_eq!(breakers[0]["service"], "order-service");
    assert_eq!(breakers[0]["operation"], "names");
    assert_eq!(breakers[0]["state"], "open");

    let res = client
        .post(gateway.url("/admin/breakers/order-service/names/reset"))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let snapshot: serde_json::Value = res.json().await.unwrap();
    assert_eq!(snapshot["state"], "closed");

    let res = client
        .post(gateway.url("/admin/breakers/order-service/missing/reset"))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn test_admin_disabled_by_default() {
    let gateway = start_gateway(config_with_backends(&[])).await;
    let res = client()
        .get(gateway.url("/admin/status"))
        .bearer_auth("CHANGE_ME_IN_PRODUCTION")
        .send()
        .await
        .unwrap();
    assert_ne!(res.status(), 200);
}
