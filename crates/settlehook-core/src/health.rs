//! # Health Tracker
//!
//! Turns delivery outcomes into subscription health state.
//!
//! A successful delivery clears the failure count. A notification whose
//! attempts were all exhausted counts as one failure; when the count reaches
//! the threshold the subscription is moved to `failed` and stops matching
//! events until an operator reactivates it. This is the only code path that
//! changes failure counts or sets `failed`.

use crate::{
    delivery::DeliveryOutcome,
    registry::SubscriptionRegistry,
    subscription::{HealthTransition, HealthUpdate},
    SubscriptionId, Timestamp,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Consecutive exhausted notifications before a subscription is quarantined
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 10;

/// Records delivery outcomes against the registry
#[derive(Clone)]
pub struct HealthTracker {
    registry: Arc<dyn SubscriptionRegistry>,
    failure_threshold: u32,
}

impl HealthTracker {
    pub fn new(registry: Arc<dyn SubscriptionRegistry>) -> Self {
        Self {
            registry,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }

    /// Override the quarantine threshold (values below 1 are raised to 1)
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Record the terminal outcome of one notification to one subscription
    ///
    /// Returns the resulting transition, or `None` if the subscription no
    /// longer exists, the registry failed, or nothing was sent. Registry
    /// failures are logged and never returned.
    pub async fn report(
        &self,
        subscription_id: SubscriptionId,
        outcome: &DeliveryOutcome,
    ) -> Option<HealthTransition> {
        let at = Timestamp::now();
        let update = match outcome {
            DeliveryOutcome::Delivered { .. } => HealthUpdate::Delivered { at },
            DeliveryOutcome::Exhausted { .. } => HealthUpdate::Exhausted {
                at,
                failure_threshold: self.failure_threshold,
            },
            DeliveryOutcome::Abandoned { error } => {
                error!(
                    subscription_id = %subscription_id,
                    error = %error,
                    "Delivery abandoned before sending; subscription health unchanged"
                );
                return None;
            }
        };

        let transition = match self.registry.apply_health_update(subscription_id, update).await {
            Ok(Some(transition)) => transition,
            Ok(None) => {
                debug!(
                    subscription_id = %subscription_id,
                    "Subscription removed before delivery outcome was recorded"
                );
                return None;
            }
            Err(e) => {
                error!(
                    subscription_id = %subscription_id,
                    error = %e,
                    "Failed to record delivery outcome"
                );
                return None;
            }
        };

        if transition.quarantined() {
            warn!(
                subscription_id = %subscription_id,
                failure_count = transition.failure_count,
                threshold = self.failure_threshold,
                "Subscription disabled after repeated delivery failures"
            );
        } else if let DeliveryOutcome::Exhausted { last_error, .. } = outcome {
            warn!(
                subscription_id = %subscription_id,
                failure_count = transition.failure_count,
                threshold = self.failure_threshold,
                error = %last_error,
                "Webhook delivery failed"
            );
        }

        Some(transition)
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
