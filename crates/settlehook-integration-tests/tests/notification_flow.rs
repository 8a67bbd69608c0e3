//! End-to-end notification scenarios through the HTTP surface
//!
//! Events enter via `POST /api/events`; subscriber endpoints are wiremock
//! servers. Deliveries are fire-and-forget, so effects are polled for.

mod common;

use common::{create_test_app, eventually, received, MAX_ATTEMPTS};
use settlehook_core::{verify_signature, SubscriptionRegistry, WebhookSecret};
use std::time::Duration;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Unsigned subscriber receives exactly one POST with the event envelope
#[tokio::test]
async fn test_unsigned_subscriber_receives_envelope() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payouts"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let app = create_test_app();
    let id = app
        .register(&format!("{}/payouts", server.uri()), &["onPayoutCompleted"], None)
        .await;

    // Act
    let recipients = app
        .notify("onPayoutCompleted", serde_json::json!({"payoutId": "p-42"}))
        .await;

    // Assert
    assert_eq!(recipients, 1);
    let server = &server;
    eventually("subscriber received the payout", || async move {
        received(server).await == 1
    })
    .await;

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    assert!(request.headers.get("x-webhook-signature").is_none());
    assert_eq!(
        request.headers.get("x-webhook-event").unwrap(),
        "onPayoutCompleted"
    );
    assert_eq!(
        request.headers.get("content-type").unwrap(),
        "application/json"
    );

    let body: serde_json::Value = request.body_json().unwrap();
    assert_eq!(body["event"], "onPayoutCompleted");
    assert_eq!(body["subscriptionId"], id.as_str());
    assert_eq!(body["data"]["payoutId"], "p-42");
    assert_eq!(
        request.headers.get("x-webhook-timestamp").unwrap().to_str().unwrap(),
        body["timestamp"].as_str().unwrap()
    );
}

/// Subscriber not subscribed to the event gets nothing
#[tokio::test]
async fn test_unsubscribed_event_is_not_delivered() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let app = create_test_app();
    app.register(&server.uri(), &["onSwapFinalized"], Some("s3cr3t"))
        .await;

    // Act
    let recipients = app
        .notify("onComplianceFlag", serde_json::json!({"flag": "sanctions"}))
        .await;

    // Assert
    assert_eq!(recipients, 0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(received(&server).await, 0);
}

/// Signed deliveries verify against the raw body with the shared secret
#[tokio::test]
async fn test_signed_delivery_verifies_at_subscriber() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    let app = create_test_app();
    app.register(&server.uri(), &["onSwapFinalized"], Some("s3cr3t"))
        .await;

    // Act
    app.notify("onSwapFinalized", serde_json::json!({"swapId": 7}))
        .await;

    // Assert
    let server = &server;
    eventually("signed delivery arrived", || async move {
        received(server).await == 1
    })
    .await;

    let requests = server.received_requests().await.unwrap();
    let signature = requests[0]
        .headers
        .get("x-webhook-signature")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(signature.starts_with("sha256="));

    let secret = WebhookSecret::new("s3cr3t").unwrap();
    assert!(verify_signature(&requests[0].body, &signature, &secret));

    let wrong = WebhookSecret::new("other").unwrap();
    assert!(!verify_signature(&requests[0].body, &signature, &wrong));
}

/// A failing endpoint is quarantined after ten exhausted notifications
#[tokio::test]
async fn test_failing_endpoint_is_quarantined_after_ten_notifications() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let app = create_test_app();
    let id = app
        .register(&server.uri(), &["onCrossChainInitiated"], None)
        .await;

    // Act: one notification at a time so each count is observable
    for expected_failures in 1..=10u64 {
        let recipients = app
            .notify("onCrossChainInitiated", serde_json::json!({"n": expected_failures}))
            .await;
        assert_eq!(recipients, 1);

        let app = &app;
        let id = id.as_str();
        eventually("failure recorded", || async move {
            app.subscription(id).await["failure_count"] == expected_failures
        })
        .await;
    }

    // Assert
    let subscription = app.subscription(&id).await;
    assert_eq!(subscription["status"], "failed");
    assert!(!subscription["last_triggered_at"].is_null());
    assert_eq!(received(&server).await, 10 * MAX_ATTEMPTS as usize);

    let recipients = app
        .notify("onCrossChainInitiated", serde_json::json!({"n": 11}))
        .await;
    assert_eq!(recipients, 0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(received(&server).await, 10 * MAX_ATTEMPTS as usize);
}

/// A transient failure followed by success resets the failure count
#[tokio::test]
async fn test_retry_recovers_and_resets_failure_count() {
    // Arrange: first attempt fails, later ones succeed
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let app = create_test_app();
    let id = app.register(&server.uri(), &["onSwapFinalized"], None).await;

    // Act
    app.notify("onSwapFinalized", serde_json::json!({})).await;

    // Assert
    let registry = &app.registry;
    let subscription_id = id.parse().unwrap();
    eventually("delivery recorded", || async move {
        registry
            .get(subscription_id)
            .await
            .unwrap()
            .map(|s| s.last_triggered_at.is_some())
            .unwrap_or(false)
    })
    .await;

    let subscription = app.subscription(&id).await;
    assert_eq!(subscription["failure_count"], 0);
    assert_eq!(subscription["status"], "active");
    assert_eq!(received(&server).await, 2);
}

/// One dead subscriber does not hold up or affect another
#[tokio::test]
async fn test_recipients_are_isolated() {
    // Arrange
    let healthy = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-webhook-event", "onCrossChainCompleted"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&healthy)
        .await;
    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken)
        .await;

    let app = create_test_app();
    let healthy_id = app
        .register(&healthy.uri(), &["onCrossChainCompleted"], None)
        .await;
    let broken_id = app
        .register(&broken.uri(), &["onCrossChainCompleted"], None)
        .await;

    // Act
    let recipients = app
        .notify("onCrossChainCompleted", serde_json::json!({"transferId": "x-1"}))
        .await;

    // Assert
    assert_eq!(recipients, 2);
    let app_ref = &app;
    let broken_ref = broken_id.as_str();
    eventually("broken subscriber exhausted", || async move {
        app_ref.subscription(broken_ref).await["failure_count"] == 1
    })
    .await;

    assert_eq!(received(&healthy).await, 1);
    let healthy_record = app.subscription(&healthy_id).await;
    assert_eq!(healthy_record["failure_count"], 0);
    assert!(!healthy_record["last_triggered_at"].is_null());
}

/// Operator test delivery is synchronous and stamps last_triggered_at
#[tokio::test]
async fn test_operator_test_delivery_reports_success() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-webhook-event", "onPayoutCompleted"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let app = create_test_app();
    let id = app
        .register(
            &server.uri(),
            &["onSwapFinalized", "onPayoutCompleted"],
            Some("s3cr3t"),
        )
        .await;

    // Act
    let (status, result) = app
        .send(
            axum::http::Method::POST,
            &format!("/api/subscriptions/{}/test?event=onPayoutCompleted", id),
            None,
        )
        .await;

    // Assert
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(result["success"], true);
    assert_eq!(result["attempts"], 1);
    assert!(!app.subscription(&id).await["last_triggered_at"].is_null());

    let body: serde_json::Value = server.received_requests().await.unwrap()[0]
        .body_json()
        .unwrap();
    assert_eq!(body["data"]["test"], true);
}
