//! # Subscription Registry
//!
//! Storage contract for webhook subscriptions.
//!
//! The registry is the only shared mutable state in the notification path.
//! Backends must apply [`SubscriptionRegistry::apply_health_update`] as one
//! atomic read-modify-write per record so that concurrent deliveries to the
//! same subscription never lose a failure-count increment. Updates to
//! different subscriptions must not serialize behind each other.

use crate::{
    events::EventType,
    subscription::{HealthTransition, HealthUpdate, NewSubscription, Subscription, SubscriptionStatus},
    SubscriptionId, ValidationError,
};
use async_trait::async_trait;

mod memory;

pub use memory::InMemorySubscriptionRegistry;

/// Errors raised by registry backends
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("Storage failure: {message}")]
    Storage { message: String },
}

/// Interface for subscription storage
///
/// "Not found" is reported through `Option`/`bool` results rather than as an
/// error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    /// Store a new active subscription with a freshly generated ID
    async fn register(&self, input: NewSubscription) -> Result<Subscription, RegistryError>;

    /// All subscriptions in any status, in no particular order
    async fn list(&self) -> Result<Vec<Subscription>, RegistryError>;

    async fn get(&self, id: SubscriptionId) -> Result<Option<Subscription>, RegistryError>;

    /// Delete a subscription; `false` if it did not exist
    async fn remove(&self, id: SubscriptionId) -> Result<bool, RegistryError>;

    /// Operator status change; `false` if the subscription does not exist
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the transition is not allowed for operators.
    async fn set_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
    ) -> Result<bool, RegistryError>;

    /// Active subscriptions that subscribe to `event_type`
    async fn matching(&self, event_type: EventType) -> Result<Vec<Subscription>, RegistryError>;

    /// Atomically apply a delivery outcome to one subscription
    ///
    /// Returns `None` if the subscription was removed while the delivery was
    /// in flight.
    async fn apply_health_update(
        &self,
        id: SubscriptionId,
        update: HealthUpdate,
    ) -> Result<Option<HealthTransition>, RegistryError>;
}
