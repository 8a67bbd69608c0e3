//! Tests for the delivery engine against mock subscriber endpoints

use super::*;
use crate::{
    events::{EventType, Notification},
    signing::{verify_signature, WebhookSecret},
    subscription::NewSubscription,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, Request, Respond, ResponseTemplate,
};

fn fast_config(max_attempts: u32) -> DeliveryConfig {
    DeliveryConfig {
        backoff: BackoffPolicy::new(max_attempts, Duration::from_millis(10)),
        request_timeout: Duration::from_secs(2),
        user_agent: DEFAULT_USER_AGENT.to_string(),
    }
}

fn subscription_for(server: &MockServer, secret: Option<&str>) -> Subscription {
    let input = NewSubscription::new(
        &format!("{}/hook", server.uri()),
        [EventType::PayoutCompleted],
        secret.map(str::to_string),
    )
    .unwrap();
    Subscription::new(input)
}

fn payout_envelope(subscription: &Subscription) -> DeliveryEnvelope {
    Notification::new(EventType::PayoutCompleted, json!({"payoutId": "p-42"}))
        .envelope_for(subscription.id)
}

// ============================================================================
// Construction Tests
// ============================================================================

#[test]
fn test_invalid_user_agent_is_rejected_at_construction() {
    let mut config = fast_config(3);
    config.user_agent = "settlehook\nbad".to_string();

    let result = DeliveryEngine::new(config);

    assert!(matches!(
        result,
        Err(DeliveryError::InvalidUserAgent { .. })
    ));
}

#[test]
fn test_abandoned_outcome_made_no_attempts() {
    let outcome = DeliveryOutcome::Abandoned {
        error: AttemptError::Request {
            message: "envelope serialization failed".to_string(),
        },
    };

    assert_eq!(outcome.attempts(), 0);
    assert!(!outcome.is_delivered());
}

// ============================================================================
// Success Path Tests
// ============================================================================

#[tokio::test]
async fn test_2xx_response_is_delivered_on_first_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let engine = DeliveryEngine::new(fast_config(3)).unwrap();
    let subscription = subscription_for(&server, None);

    let outcome = engine
        .deliver(&subscription, &payout_envelope(&subscription))
        .await;

    assert_eq!(
        outcome,
        DeliveryOutcome::Delivered {
            attempts: 1,
            status: 202
        }
    );
}

#[tokio::test]
async fn test_request_carries_envelope_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("content-type", "application/json"))
        .and(header("x-webhook-event", "onPayoutCompleted"))
        .and(header("user-agent", DEFAULT_USER_AGENT))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let engine = DeliveryEngine::new(fast_config(1)).unwrap();
    let subscription = subscription_for(&server, None);
    let envelope = payout_envelope(&subscription);

    let outcome = engine.deliver(&subscription, &envelope).await;
    assert!(outcome.is_delivered());

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();

    assert_eq!(body["event"], "onPayoutCompleted");
    assert_eq!(body["data"]["payoutId"], "p-42");
    assert_eq!(body["subscriptionId"], subscription.id.to_string());
    assert_eq!(
        request.headers.get("x-webhook-timestamp").unwrap().to_str().unwrap(),
        envelope.timestamp.to_rfc3339()
    );
    assert!(request.headers.get("x-webhook-signature").is_none());
}

#[tokio::test]
async fn test_signature_covers_exact_body_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let engine = DeliveryEngine::new(fast_config(1)).unwrap();
    let subscription = subscription_for(&server, Some("s3cr3t"));

    engine
        .deliver(&subscription, &payout_envelope(&subscription))
        .await;

    let requests = server.received_requests().await.unwrap();
    let signature = requests[0]
        .headers
        .get("x-webhook-signature")
        .unwrap()
        .to_str()
        .unwrap();

    let secret = WebhookSecret::new("s3cr3t").unwrap();
    assert!(signature.starts_with("sha256="));
    assert!(verify_signature(&requests[0].body, signature, &secret));
}

#[tokio::test]
async fn test_recovers_after_transient_failure() {
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

    let engine = DeliveryEngine::new(fast_config(3)).unwrap();
    let subscription = subscription_for(&server, None);

    let outcome = engine
        .deliver(&subscription, &payout_envelope(&subscription))
        .await;

    assert_eq!(
        outcome,
        DeliveryOutcome::Delivered {
            attempts: 2,
            status: 200
        }
    );
}

#[tokio::test]
async fn test_every_attempt_sends_identical_body_and_signature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let engine = DeliveryEngine::new(fast_config(3)).unwrap();
    let subscription = subscription_for(&server, Some("s3cr3t"));

    engine
        .deliver(&subscription, &payout_envelope(&subscription))
        .await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    for request in &requests[1..] {
        assert_eq!(request.body, requests[0].body);
        assert_eq!(
            request.headers.get("x-webhook-signature"),
            requests[0].headers.get("x-webhook-signature")
        );
    }
}

// ============================================================================
// Failure Path Tests
// ============================================================================

#[tokio::test]
async fn test_persistent_500_exhausts_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let engine = DeliveryEngine::new(fast_config(3)).unwrap();
    let subscription = subscription_for(&server, None);

    let outcome = engine
        .deliver(&subscription, &payout_envelope(&subscription))
        .await;

    assert_eq!(
        outcome,
        DeliveryOutcome::Exhausted {
            attempts: 3,
            last_error: AttemptError::HttpStatus { status: 500 }
        }
    );
}

/// Responds with 500 and records when each request arrived
#[derive(Clone, Default)]
struct ArrivalRecorder {
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl Respond for ArrivalRecorder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        ResponseTemplate::new(500)
    }
}

#[tokio::test]
async fn test_waits_grow_exponentially_between_attempts() {
    let server = MockServer::start().await;
    let recorder = ArrivalRecorder::default();
    Mock::given(method("POST"))
        .respond_with(recorder.clone())
        .mount(&server)
        .await;

    let mut config = fast_config(3);
    config.backoff = BackoffPolicy::new(3, Duration::from_millis(100));
    let engine = DeliveryEngine::new(config).unwrap();
    let subscription = subscription_for(&server, None);

    let outcome = engine
        .deliver(&subscription, &payout_envelope(&subscription))
        .await;

    assert_eq!(outcome.attempts(), 3);
    let arrivals = recorder.arrivals.lock().unwrap().clone();
    assert_eq!(arrivals.len(), 3);

    let first_gap = arrivals[1] - arrivals[0];
    let second_gap = arrivals[2] - arrivals[1];
    assert!(
        first_gap >= Duration::from_millis(100) && first_gap < Duration::from_millis(190),
        "first wait was {:?}",
        first_gap
    );
    assert!(
        second_gap >= Duration::from_millis(200) && second_gap < Duration::from_millis(300),
        "second wait was {:?}",
        second_gap
    );
}

#[tokio::test]
async fn test_redirect_is_not_followed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "https://example.com/"))
        .expect(1)
        .mount(&server)
        .await;

    let engine = DeliveryEngine::new(fast_config(1)).unwrap();
    let subscription = subscription_for(&server, None);

    let outcome = engine
        .deliver(&subscription, &payout_envelope(&subscription))
        .await;

    assert_eq!(
        outcome,
        DeliveryOutcome::Exhausted {
            attempts: 1,
            last_error: AttemptError::HttpStatus { status: 302 }
        }
    );
}

#[tokio::test]
async fn test_hung_endpoint_is_cut_off_at_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let mut config = fast_config(1);
    config.request_timeout = Duration::from_millis(100);
    let engine = DeliveryEngine::new(config).unwrap();
    let subscription = subscription_for(&server, None);

    let started = Instant::now();
    let outcome = engine
        .deliver(&subscription, &payout_envelope(&subscription))
        .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(
        outcome,
        DeliveryOutcome::Exhausted {
            attempts: 1,
            last_error: AttemptError::Timeout { timeout_ms: 100 }
        }
    );
}

#[tokio::test]
async fn test_connection_refused_is_a_network_failure() {
    let input = NewSubscription::new("http://127.0.0.1:1/hook", [EventType::SwapFinalized], None)
        .unwrap();
    let subscription = Subscription::new(input);
    let envelope = Notification::new(EventType::SwapFinalized, json!({})).envelope_for(subscription.id);

    let engine = DeliveryEngine::new(fast_config(2)).unwrap();
    let outcome = engine.deliver(&subscription, &envelope).await;

    match outcome {
        DeliveryOutcome::Exhausted {
            attempts,
            last_error: AttemptError::Network { .. },
        } => assert_eq!(attempts, 2),
        other => panic!("expected network exhaustion, got {:?}", other),
    }
}
