//! # Dispatcher
//!
//! Fans a business event out to every matching subscription.
//!
//! [`WebhookDispatcher::notify`] resolves recipients, spawns one independent
//! task per subscription and returns without waiting for any delivery. Each
//! task owns its retry loop and reports its own outcome to the
//! [`HealthTracker`]; a slow or failing recipient never delays another one,
//! and no delivery error reaches the caller.

use crate::{
    delivery::{DeliveryEngine, DeliveryOutcome},
    events::{EventType, Notification},
    health::HealthTracker,
    registry::SubscriptionRegistry,
    subscription::Subscription,
    SubscriptionId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, instrument, Instrument};

// ============================================================================
// Dispatch Handle
// ============================================================================

/// Fan-out scheduled by one `notify` call
///
/// Dropping this leaves every delivery running to completion.
#[derive(Debug)]
pub struct Dispatch {
    notification: Notification,
    recipients: Vec<SubscriptionId>,
    tasks: Vec<JoinHandle<DeliveryOutcome>>,
}

impl Dispatch {
    fn empty(notification: Notification) -> Self {
        Self {
            notification,
            recipients: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn notification(&self) -> &Notification {
        &self.notification
    }

    pub fn recipients(&self) -> &[SubscriptionId] {
        &self.recipients
    }

    pub fn recipient_count(&self) -> usize {
        self.recipients.len()
    }

    /// Wait for every delivery to finish, in recipient order
    ///
    /// Intended for diagnostics and tests. Outcomes have already been
    /// reported to the health tracker by the time they are returned.
    pub async fn wait(self) -> Vec<(SubscriptionId, DeliveryOutcome)> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        for (id, task) in self.recipients.into_iter().zip(self.tasks) {
            match task.await {
                Ok(outcome) => outcomes.push((id, outcome)),
                Err(e) => error!(subscription_id = %id, error = %e, "Delivery task did not complete"),
            }
        }
        outcomes
    }
}

// ============================================================================
// Test Delivery
// ============================================================================

/// Synchronous result of an operator-triggered test delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDeliveryResult {
    pub success: bool,
    pub message: String,
    pub attempts: u32,
}

impl TestDeliveryResult {
    fn not_attempted(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            attempts: 0,
        }
    }
}

// ============================================================================
// Webhook Dispatcher
// ============================================================================

/// Entry point used by business operations to broadcast events
#[derive(Clone)]
pub struct WebhookDispatcher {
    registry: Arc<dyn SubscriptionRegistry>,
    engine: Arc<DeliveryEngine>,
    health: Arc<HealthTracker>,
}

impl WebhookDispatcher {
    pub fn new(
        registry: Arc<dyn SubscriptionRegistry>,
        engine: Arc<DeliveryEngine>,
        health: Arc<HealthTracker>,
    ) -> Self {
        Self {
            registry,
            engine,
            health,
        }
    }

    pub fn registry(&self) -> &Arc<dyn SubscriptionRegistry> {
        &self.registry
    }

    /// Broadcast an event to every active subscriber of `event_type`
    ///
    /// Returns as soon as deliveries are scheduled. Having no subscribers is
    /// not an error, and a registry failure is logged and yields an empty
    /// dispatch. Must be called from within a Tokio runtime.
    #[instrument(skip(self, payload), fields(event = %event_type))]
    pub async fn notify(&self, event_type: EventType, payload: serde_json::Value) -> Dispatch {
        let notification = Notification::new(event_type, payload);

        let subscriptions = match self.registry.matching(event_type).await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                error!(error = %e, "Cannot resolve webhook recipients");
                return Dispatch::empty(notification);
            }
        };

        if subscriptions.is_empty() {
            debug!("No subscribers for event");
            return Dispatch::empty(notification);
        }

        let mut recipients = Vec::with_capacity(subscriptions.len());
        let mut tasks = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            recipients.push(subscription.id);
            tasks.push(self.spawn_delivery(subscription, &notification));
        }

        info!(recipients = recipients.len(), "Webhook fan-out scheduled");

        Dispatch {
            notification,
            recipients,
            tasks,
        }
    }

    fn spawn_delivery(
        &self,
        subscription: Subscription,
        notification: &Notification,
    ) -> JoinHandle<DeliveryOutcome> {
        let envelope = notification.envelope_for(subscription.id);
        let engine = Arc::clone(&self.engine);
        let health = Arc::clone(&self.health);
        let span = info_span!(
            "webhook_delivery",
            subscription_id = %subscription.id,
            event = %notification.event_type
        );

        tokio::spawn(
            async move {
                let outcome = engine.deliver(&subscription, &envelope).await;
                health.report(subscription.id, &outcome).await;
                outcome
            }
            .instrument(span),
        )
    }

    /// Run one full delivery sequence to a single subscription and wait for it
    ///
    /// Works for any status, so operators can probe inactive or failed
    /// endpoints. The outcome is recorded like any other delivery. `event`
    /// defaults to the subscription's first subscribed type.
    #[instrument(skip(self, id), fields(subscription_id = %id))]
    pub async fn test_delivery(
        &self,
        id: SubscriptionId,
        event: Option<EventType>,
    ) -> TestDeliveryResult {
        let subscription = match self.registry.get(id).await {
            Ok(Some(subscription)) => subscription,
            Ok(None) => return TestDeliveryResult::not_attempted("Subscription not found"),
            Err(e) => {
                error!(error = %e, "Cannot load subscription for test delivery");
                return TestDeliveryResult::not_attempted(format!("Registry error: {}", e));
            }
        };

        let event_type = event
            .or_else(|| subscription.event_types.iter().next().copied())
            .unwrap_or(EventType::SwapFinalized);
        let notification = Notification::new(
            event_type,
            serde_json::json!({
                "test": true,
                "message": "This is a test webhook delivery",
            }),
        );
        let envelope = notification.envelope_for(subscription.id);

        let outcome = self.engine.deliver(&subscription, &envelope).await;
        self.health.report(subscription.id, &outcome).await;

        match outcome {
            DeliveryOutcome::Delivered { attempts, status } => TestDeliveryResult {
                success: true,
                message: format!("Delivered with HTTP {}", status),
                attempts,
            },
            DeliveryOutcome::Exhausted {
                attempts,
                last_error,
            } => TestDeliveryResult {
                success: false,
                message: format!("Delivery failed: {}", last_error),
                attempts,
            },
            DeliveryOutcome::Abandoned { error } => {
                TestDeliveryResult::not_attempted(format!("Delivery not sent: {}", error))
            }
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
