//! # Events Module
//!
//! Event types broadcast to subscribers and the envelope that carries them.
//!
//! A [`Notification`] is created once per `notify` call and stamped with the
//! dispatch time. Each recipient receives a [`DeliveryEnvelope`] built from it,
//! which differs only in `subscriptionId`.

use crate::{SubscriptionId, Timestamp, ValidationError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Event Types
// ============================================================================

/// Business events that can be broadcast to webhook subscribers
///
/// The set is fixed; new kinds of event are added as new variants. Serialized
/// using the wire tags subscribers filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    /// A currency swap has been settled
    #[serde(rename = "onSwapFinalized")]
    SwapFinalized,

    /// A payout batch has been executed
    #[serde(rename = "onPayoutCompleted")]
    PayoutCompleted,

    /// A compliance check raised a flag
    #[serde(rename = "onComplianceFlag")]
    ComplianceFlag,

    /// A cross-chain transfer has been submitted
    #[serde(rename = "onCrossChainInitiated")]
    CrossChainInitiated,

    /// A cross-chain transfer has landed on the destination chain
    #[serde(rename = "onCrossChainCompleted")]
    CrossChainCompleted,
}

impl EventType {
    /// Every recognised event type
    pub const ALL: [EventType; 5] = [
        EventType::SwapFinalized,
        EventType::PayoutCompleted,
        EventType::ComplianceFlag,
        EventType::CrossChainInitiated,
        EventType::CrossChainCompleted,
    ];

    /// Wire tag for this event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SwapFinalized => "onSwapFinalized",
            EventType::PayoutCompleted => "onPayoutCompleted",
            EventType::ComplianceFlag => "onComplianceFlag",
            EventType::CrossChainInitiated => "onCrossChainInitiated",
            EventType::CrossChainCompleted => "onCrossChainCompleted",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "event_type".to_string(),
                message: format!("unknown event type '{}'", s),
            })
    }
}

// ============================================================================
// Notification
// ============================================================================

/// A business event ready to be fanned out
///
/// The payload is opaque; it is serialized into the envelope and never
/// inspected.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub timestamp: Timestamp,
}

impl Notification {
    /// Create a notification stamped with the current time
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            event_type,
            payload,
            timestamp: Timestamp::now(),
        }
    }

    /// Build the envelope sent to one recipient
    pub fn envelope_for(&self, subscription_id: SubscriptionId) -> DeliveryEnvelope {
        DeliveryEnvelope {
            event: self.event_type,
            timestamp: self.timestamp,
            data: self.payload.clone(),
            subscription_id,
        }
    }
}

// ============================================================================
// Delivery Envelope
// ============================================================================

/// JSON body POSTed to a subscriber endpoint
///
/// ```json
/// {
///   "event": "onPayoutCompleted",
///   "timestamp": "2024-05-01T10:30:00.000000Z",
///   "data": { "payoutId": "p-1" },
///   "subscriptionId": "6f1c..."
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryEnvelope {
    pub event: EventType,
    pub timestamp: Timestamp,
    pub data: serde_json::Value,
    pub subscription_id: SubscriptionId,
}

impl DeliveryEnvelope {
    /// Serialize the envelope to the exact bytes sent (and signed)
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
