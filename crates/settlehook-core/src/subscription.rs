//! # Subscription Module
//!
//! Subscription records and the rules for changing their state.
//!
//! Status transitions are implemented here as plain methods on
//! [`Subscription`] so that every registry backend applies identical rules:
//!
//! ```text
//!            operator              health tracker (threshold)
//!   active <----------> inactive ---------------------------+
//!     |  ^                                                  |
//!     |  +------------- operator reactivation --------+     |
//!     +--------- health tracker (threshold) ------> failed <+
//! ```

use crate::{events::EventType, signing::WebhookSecret, SubscriptionId, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use url::Url;

// ============================================================================
// Subscription Status
// ============================================================================

/// Delivery eligibility of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Receives deliveries
    Active,

    /// Disabled by an operator
    Inactive,

    /// Disabled automatically after repeated delivery failures
    Failed,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "inactive" => Ok(SubscriptionStatus::Inactive),
            "failed" => Ok(SubscriptionStatus::Failed),
            _ => Err(ValidationError::InvalidFormat {
                field: "status".to_string(),
                message: format!("expected active, inactive or failed, got '{}'", s),
            }),
        }
    }
}

// ============================================================================
// Registration Input
// ============================================================================

/// Validated input for registering a subscription
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub endpoint: Url,
    pub event_types: BTreeSet<EventType>,
    pub secret: Option<WebhookSecret>,
}

impl NewSubscription {
    /// Validate registration input
    ///
    /// # Errors
    ///
    /// - `InvalidFormat` if `endpoint` is not an absolute http(s) URL with a host
    /// - `Required` if no event types are given
    /// - `TooShort` if a secret is given but empty
    pub fn new(
        endpoint: &str,
        event_types: impl IntoIterator<Item = EventType>,
        secret: Option<String>,
    ) -> Result<Self, ValidationError> {
        let endpoint = parse_endpoint(endpoint)?;

        let event_types: BTreeSet<EventType> = event_types.into_iter().collect();
        if event_types.is_empty() {
            return Err(ValidationError::Required {
                field: "event_types".to_string(),
            });
        }

        let secret = secret.map(WebhookSecret::new).transpose()?;

        Ok(Self {
            endpoint,
            event_types,
            secret,
        })
    }

    /// Validate registration input where event types are still wire tags
    ///
    /// Unknown tags are rejected with `InvalidFormat`.
    pub fn parse(
        endpoint: &str,
        event_types: &[String],
        secret: Option<String>,
    ) -> Result<Self, ValidationError> {
        let event_types = event_types
            .iter()
            .map(|tag| tag.parse::<EventType>())
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(endpoint, event_types, secret)
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(endpoint.trim()).map_err(|e| ValidationError::InvalidFormat {
        field: "endpoint".to_string(),
        message: format!("not a valid URL: {}", e),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidFormat {
            field: "endpoint".to_string(),
            message: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::InvalidFormat {
            field: "endpoint".to_string(),
            message: "URL has no host".to_string(),
        });
    }

    Ok(url)
}

// ============================================================================
// Subscription Record
// ============================================================================

/// A registered webhook subscription
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub endpoint: Url,
    pub event_types: BTreeSet<EventType>,
    pub secret: Option<WebhookSecret>,
    pub status: SubscriptionStatus,
    /// Consecutive notifications whose retries were all exhausted
    pub failure_count: u32,
    pub last_triggered_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Subscription {
    /// Create an active subscription with a fresh ID
    pub fn new(input: NewSubscription) -> Self {
        Self {
            id: SubscriptionId::new(),
            endpoint: input.endpoint,
            event_types: input.event_types,
            secret: input.secret,
            status: SubscriptionStatus::Active,
            failure_count: 0,
            last_triggered_at: None,
            created_at: Timestamp::now(),
        }
    }

    /// Check if this subscription should receive `event_type`
    pub fn matches(&self, event_type: EventType) -> bool {
        self.status == SubscriptionStatus::Active && self.event_types.contains(&event_type)
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// Apply the outcome of one notification's delivery sequence
    ///
    /// `Delivered` resets the failure count and never reactivates a failed
    /// subscription. `Exhausted` increments the count and moves the
    /// subscription to `Failed` once the threshold is reached.
    pub fn apply_health_update(&mut self, update: HealthUpdate) -> HealthTransition {
        let previous_status = self.status;

        match update {
            HealthUpdate::Delivered { at } => {
                self.failure_count = 0;
                self.last_triggered_at = Some(at);
            }
            HealthUpdate::Exhausted {
                at,
                failure_threshold,
            } => {
                self.failure_count = self.failure_count.saturating_add(1);
                self.last_triggered_at = Some(at);
                if self.failure_count >= failure_threshold.max(1) {
                    self.status = SubscriptionStatus::Failed;
                }
            }
        }

        HealthTransition {
            subscription_id: self.id,
            previous_status,
            status: self.status,
            failure_count: self.failure_count,
        }
    }

    /// Apply an operator-requested status change
    ///
    /// Operators may switch between `Active` and `Inactive`, and may reactivate
    /// a `Failed` subscription. The failure count is left alone: only a
    /// successful delivery clears it, so a reactivated endpoint that fails
    /// again is quarantined on its next exhausted notification. Setting
    /// `Failed` directly, or moving `Failed` to `Inactive`, is rejected.
    pub fn apply_operator_status(
        &mut self,
        target: SubscriptionStatus,
    ) -> Result<(), ValidationError> {
        match (self.status, target) {
            (_, SubscriptionStatus::Failed) => Err(ValidationError::InvalidFormat {
                field: "status".to_string(),
                message: "failed is set only by health tracking".to_string(),
            }),
            (SubscriptionStatus::Failed, SubscriptionStatus::Inactive) => {
                Err(ValidationError::InvalidFormat {
                    field: "status".to_string(),
                    message: "a failed subscription can only be reactivated".to_string(),
                })
            }
            (_, target) => {
                self.status = target;
                Ok(())
            }
        }
    }
}

// ============================================================================
// Health Updates
// ============================================================================

/// Terminal outcome of one notification to one subscription, as seen by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthUpdate {
    Delivered {
        at: Timestamp,
    },
    Exhausted {
        at: Timestamp,
        failure_threshold: u32,
    },
}

/// Result of applying a [`HealthUpdate`] to a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthTransition {
    pub subscription_id: SubscriptionId,
    pub previous_status: SubscriptionStatus,
    pub status: SubscriptionStatus,
    pub failure_count: u32,
}

impl HealthTransition {
    /// True when this update moved the subscription into `Failed`
    pub fn quarantined(&self) -> bool {
        self.previous_status != SubscriptionStatus::Failed
            && self.status == SubscriptionStatus::Failed
    }
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
