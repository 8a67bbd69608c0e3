//! # Delivery Engine
//!
//! Sends one notification to one subscription, retrying with exponential
//! backoff until the endpoint answers with a 2xx status or the attempt budget
//! is spent.
//!
//! The envelope is serialized once and the same bytes (and signature) are
//! reused for every attempt. Each attempt is bounded by the request timeout;
//! there is no deadline across the whole loop. The engine holds no state
//! beyond its HTTP client, so one instance is shared by every delivery task.

use crate::{
    events::DeliveryEnvelope,
    retry::{BackoffPolicy, RetryState},
    signing::{sign_payload, EVENT_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER},
    subscription::Subscription,
};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// User agent sent with every delivery
pub const DEFAULT_USER_AGENT: &str = concat!("settlehook/", env!("CARGO_PKG_VERSION"));

/// Per-attempt request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Configuration
// ============================================================================

/// Delivery engine settings
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Attempt budget and backoff between attempts
    pub backoff: BackoffPolicy,

    /// Upper bound on a single HTTP attempt, including connect
    pub request_timeout: Duration,

    pub user_agent: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

// ============================================================================
// Outcome and Error Types
// ============================================================================

/// Why a single delivery attempt failed
///
/// These never leave the engine as errors; the last one is carried in
/// [`DeliveryOutcome::Exhausted`] or [`DeliveryOutcome::Abandoned`] for
/// logging and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    #[error("endpoint responded with HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("no response within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("network error: {message}")]
    Network { message: String },

    /// The request could not be built; no HTTP attempt was made
    #[error("request could not be prepared: {message}")]
    Request { message: String },
}

/// Terminal result of delivering one notification to one subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The endpoint accepted the notification
    Delivered { attempts: u32, status: u16 },

    /// Every attempt failed
    Exhausted {
        attempts: u32,
        last_error: AttemptError,
    },

    /// The request could not be prepared locally, so nothing was sent
    ///
    /// This says nothing about the subscriber and is not counted against it.
    Abandoned { error: AttemptError },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    /// Number of HTTP attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts, .. }
            | DeliveryOutcome::Exhausted { attempts, .. } => *attempts,
            DeliveryOutcome::Abandoned { .. } => 0,
        }
    }
}

/// Errors constructing the delivery engine
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Failed to build HTTP client: {message}")]
    ClientBuild { message: String },

    #[error("Invalid user agent '{value}': {message}")]
    InvalidUserAgent { value: String, message: String },
}

// ============================================================================
// Delivery Engine
// ============================================================================

/// Bytes and headers sent on every attempt for one recipient
struct PreparedRequest {
    body: Bytes,
    headers: HeaderMap,
}

/// HTTP delivery with retry and backoff
#[derive(Debug, Clone)]
pub struct DeliveryEngine {
    client: reqwest::Client,
    config: DeliveryConfig,
}

impl DeliveryEngine {
    /// Create an engine with its own HTTP client
    ///
    /// Redirects are not followed; a 3xx response counts as a failed attempt.
    /// Fails if `user_agent` is not a valid header value.
    pub fn new(config: DeliveryConfig) -> Result<Self, DeliveryError> {
        let user_agent = HeaderValue::from_str(&config.user_agent).map_err(|e| {
            DeliveryError::InvalidUserAgent {
                value: config.user_agent.escape_debug().to_string(),
                message: e.to_string(),
            }
        })?;

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| DeliveryError::ClientBuild {
                message: e.to_string(),
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Deliver `envelope` to `subscription`, retrying until success or exhaustion
    ///
    /// Attempts are strictly sequential. The only suspension points are the
    /// HTTP call and the backoff sleep.
    #[instrument(
        skip(self, subscription, envelope),
        fields(subscription_id = %subscription.id, event = %envelope.event)
    )]
    pub async fn deliver(
        &self,
        subscription: &Subscription,
        envelope: &DeliveryEnvelope,
    ) -> DeliveryOutcome {
        let request = match self.prepare(subscription, envelope) {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "Cannot prepare webhook delivery");
                return DeliveryOutcome::Abandoned { error: e };
            }
        };

        let policy = &self.config.backoff;
        let mut state = RetryState::new();

        loop {
            match self.attempt(&subscription.endpoint, &request).await {
                Ok(status) => {
                    info!(attempt = state.attempt, status, "Webhook delivered");
                    return DeliveryOutcome::Delivered {
                        attempts: state.attempt,
                        status,
                    };
                }
                Err(e) if state.can_retry(policy) => {
                    let delay = state.get_delay(policy);
                    warn!(
                        attempt = state.attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Webhook delivery attempt failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    state.next_attempt();
                }
                Err(e) => {
                    warn!(
                        attempt = state.attempt,
                        error = %e,
                        "Webhook delivery exhausted all attempts"
                    );
                    return DeliveryOutcome::Exhausted {
                        attempts: state.attempt,
                        last_error: e,
                    };
                }
            }
        }
    }

    fn prepare(
        &self,
        subscription: &Subscription,
        envelope: &DeliveryEnvelope,
    ) -> Result<PreparedRequest, AttemptError> {
        let body = envelope.to_bytes().map_err(|e| AttemptError::Request {
            message: format!("envelope serialization failed: {}", e),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(EVENT_HEADER, HeaderValue::from_static(envelope.event.as_str()));
        headers.insert(TIMESTAMP_HEADER, header_value(&envelope.timestamp.to_rfc3339())?);

        if let Some(secret) = &subscription.secret {
            let signature = sign_payload(&body, secret).map_err(|e| AttemptError::Request {
                message: e.to_string(),
            })?;
            headers.insert(SIGNATURE_HEADER, header_value(&signature)?);
        }

        Ok(PreparedRequest { body, headers })
    }

    async fn attempt(&self, endpoint: &Url, request: &PreparedRequest) -> Result<u16, AttemptError> {
        let timeout = self.config.request_timeout;
        let send = self
            .client
            .post(endpoint.clone())
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send();

        // The timeout drops the in-flight future, which aborts a hung connection
        let response = match tokio::time::timeout(timeout, send).await {
            Err(_) => {
                return Err(AttemptError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Ok(Err(e)) if e.is_timeout() => {
                return Err(AttemptError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Ok(Err(e)) => {
                return Err(AttemptError::Network {
                    message: e.to_string(),
                })
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        debug!(status = status.as_u16(), "Subscriber responded");

        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(AttemptError::HttpStatus {
                status: status.as_u16(),
            })
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, AttemptError> {
    HeaderValue::from_str(value).map_err(|e| AttemptError::Request {
        message: format!("invalid header value: {}", e),
    })
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;
