//! Request bodies, response types and query parameters for the API.

use serde::{Deserialize, Serialize};
use settlehook_core::{EventType, Subscription, SubscriptionId, SubscriptionStatus, Timestamp};

// ============================================================================
// Request Types
// ============================================================================

/// Body of `POST /api/subscriptions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSubscriptionRequest {
    pub endpoint: String,
    /// Wire tags such as `onPayoutCompleted`
    pub event_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Body of `PUT /api/subscriptions/{id}/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// Body of `POST /api/events`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyRequest {
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Query parameters for `POST /api/subscriptions/{id}/test`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestDeliveryParams {
    pub event: Option<String>,
}

// ============================================================================
// Response Types
// ============================================================================

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: Timestamp,
}

/// A subscription as exposed to operators; the secret itself is never returned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub id: SubscriptionId,
    pub endpoint: String,
    pub event_types: Vec<EventType>,
    pub has_secret: bool,
    pub status: SubscriptionStatus,
    pub failure_count: u32,
    pub last_triggered_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl From<&Subscription> for SubscriptionResponse {
    fn from(subscription: &Subscription) -> Self {
        Self {
            id: subscription.id,
            endpoint: subscription.endpoint.to_string(),
            event_types: subscription.event_types.iter().copied().collect(),
            has_secret: subscription.has_secret(),
            status: subscription.status,
            failure_count: subscription.failure_count,
            last_triggered_at: subscription.last_triggered_at,
            created_at: subscription.created_at,
        }
    }
}

/// Subscription list response, newest first
#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionListResponse {
    pub subscriptions: Vec<SubscriptionResponse>,
    pub total: usize,
}

/// Response to `POST /api/events`
#[derive(Debug, Serialize, Deserialize)]
pub struct NotifyResponse {
    pub event_type: EventType,
    pub recipients: usize,
    pub timestamp: Timestamp,
}
