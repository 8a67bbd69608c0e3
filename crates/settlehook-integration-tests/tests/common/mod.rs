//! Common test utilities for settlehook integration tests
//!
//! This module provides:
//! - A router wired to an in-memory registry with millisecond backoff
//! - Request helpers returning status and parsed JSON
//! - Polling for effects of fire-and-forget deliveries

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use settlehook_api::{create_router, AppState, ServiceConfig, ServiceMetrics};
use settlehook_core::{
    BackoffPolicy, DeliveryConfig, DeliveryEngine, HealthTracker, InMemorySubscriptionRegistry,
    WebhookDispatcher,
};
use std::{future::Future, sync::Arc, time::Duration};
use tower::ServiceExt;

/// Attempts per notification in the test wiring
#[allow(dead_code)]
pub const MAX_ATTEMPTS: u32 = 2;

/// Router plus direct access to the registry behind it
pub struct TestApp {
    pub router: Router,
    #[allow(dead_code)]
    pub registry: Arc<InMemorySubscriptionRegistry>,
}

/// Build the full router with fast retries and the default quarantine threshold
pub fn create_test_app() -> TestApp {
    let registry = Arc::new(InMemorySubscriptionRegistry::new());
    let delivery = DeliveryConfig {
        backoff: BackoffPolicy::new(MAX_ATTEMPTS, Duration::from_millis(5))
            .with_max_delay(Duration::from_millis(20)),
        request_timeout: Duration::from_secs(2),
        ..DeliveryConfig::default()
    };
    let engine = Arc::new(DeliveryEngine::new(delivery).unwrap());
    let health = Arc::new(HealthTracker::new(registry.clone()));
    let dispatcher = WebhookDispatcher::new(registry.clone(), engine, health);

    let state = AppState::new(
        ServiceConfig::default(),
        dispatcher,
        ServiceMetrics::new().unwrap(),
    );

    TestApp {
        router: create_router(state),
        registry,
    }
}

impl TestApp {
    /// Send a request and return status plus JSON body (`Null` when empty)
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    /// Register a subscription and return its id
    pub async fn register(&self, endpoint: &str, events: &[&str], secret: Option<&str>) -> String {
        let mut body = serde_json::json!({"endpoint": endpoint, "event_types": events});
        if let Some(secret) = secret {
            body["secret"] = serde_json::json!(secret);
        }

        let (status, created) = self
            .send(Method::POST, "/api/subscriptions", Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "registration failed: {}", created);
        created["id"].as_str().unwrap().to_string()
    }

    /// Publish an event and return the reported recipient count
    #[allow(dead_code)]
    pub async fn notify(&self, event: &str, payload: serde_json::Value) -> u64 {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/events",
                Some(serde_json::json!({"event_type": event, "payload": payload})),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        body["recipients"].as_u64().unwrap()
    }

    /// Fetch one subscription as JSON
    #[allow(dead_code)]
    pub async fn subscription(&self, id: &str) -> serde_json::Value {
        let (status, body) = self
            .send(Method::GET, &format!("/api/subscriptions/{}", id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        body
    }
}

/// Poll `check` until it holds, failing the test after five seconds
#[allow(dead_code)]
pub async fn eventually<F, Fut>(description: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("Condition not met within 5s: {}", description);
}

/// Number of requests a mock subscriber has received so far
#[allow(dead_code)]
pub async fn received(server: &wiremock::MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or(0)
}
