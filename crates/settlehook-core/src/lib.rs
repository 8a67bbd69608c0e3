//! # Settlehook Core
//!
//! Webhook notification subsystem for the settlement backend.
//!
//! Business operations (swap settlement, payouts, compliance checks, cross-chain
//! transfers) call [`WebhookDispatcher::notify`] once their domain event is
//! durably recorded. The dispatcher fans the event out to every active
//! subscription, each delivery running its own retry loop, and the outcome of
//! every delivery feeds the [`HealthTracker`] which quarantines endpoints that
//! keep failing.
//!
//! ## Architecture
//!
//! - Subscriptions live behind the [`SubscriptionRegistry`] trait so the storage
//!   backend can be swapped without touching dispatch or health logic
//! - The [`DeliveryEngine`] owns no persistent state; it turns a subscription and
//!   an envelope into a [`DeliveryOutcome`]
//! - Health state transitions are pure functions on [`Subscription`] applied by the
//!   registry under a per-record lock
//!
//! ## Usage
//!
//! ```rust
//! use settlehook_core::{EventType, SubscriptionId};
//!
//! let id = SubscriptionId::new();
//! let event: EventType = "onPayoutCompleted".parse().unwrap();
//! assert_eq!(event, EventType::PayoutCompleted);
//! assert_ne!(id, SubscriptionId::new());
//! ```

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub use uuid::Uuid;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Unique identifier for a webhook subscription
///
/// Generated at registration time and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Generate a new unique subscription ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID, e.g. when loading from storage
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriptionId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = s.parse::<Uuid>().map_err(|_| ParseError::InvalidFormat {
            expected: "UUID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(uuid))
    }
}

// ============================================================================
// Time Types
// ============================================================================

/// UTC timestamp with microsecond precision
///
/// Serialized as the same ISO-8601 string that [`Timestamp::to_rfc3339`]
/// produces, so the envelope body and the timestamp header always agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now().trunc_subsecs(6))
    }

    /// Parse timestamp from RFC3339 string
    pub fn from_rfc3339(s: &str) -> Result<Self, ParseError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|_| ParseError::InvalidFormat {
                expected: "RFC3339 datetime".to_string(),
                actual: s.to_string(),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }

    /// Convert to an ISO-8601 string in UTC (`Z` suffix)
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_rfc3339(&raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error type for input validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    TooLong { field: String, max_length: usize },

    #[error("Field '{field}' is below minimum length of {min_length}")]
    TooShort { field: String, min_length: usize },

    #[error("Field '{field}' contains invalid characters: {invalid_chars}")]
    InvalidCharacters {
        field: String,
        invalid_chars: String,
    },
}

/// Error type for string parsing failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

// ============================================================================
// Module declarations
// ============================================================================

/// Delivery backoff policy
pub mod retry;

/// Event types, notifications and the delivery envelope
pub mod events;

/// Payload signing for subscriber authentication
pub mod signing;

/// Subscription records and their state transitions
pub mod subscription;

/// Subscription storage contract and in-memory backend
pub mod registry;

/// Single-subscription delivery with retry and backoff
pub mod delivery;

/// Subscription health bookkeeping
pub mod health;

/// Event fan-out to matching subscriptions
pub mod dispatcher;

// Re-export key types for convenience
pub use delivery::{AttemptError, DeliveryConfig, DeliveryEngine, DeliveryError, DeliveryOutcome};
pub use dispatcher::{Dispatch, TestDeliveryResult, WebhookDispatcher};
pub use events::{DeliveryEnvelope, EventType, Notification};
pub use health::{HealthTracker, DEFAULT_FAILURE_THRESHOLD};
pub use registry::{InMemorySubscriptionRegistry, RegistryError, SubscriptionRegistry};
pub use retry::{BackoffPolicy, RetryState};
pub use signing::{sign_payload, verify_signature, WebhookSecret};
pub use subscription::{
    HealthTransition, HealthUpdate, NewSubscription, Subscription, SubscriptionStatus,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
