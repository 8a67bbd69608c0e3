//! # In-Memory Subscription Registry
//!
//! Process-local registry backend. Subscriptions are lost on restart.
//!
//! The outer map lock is held only long enough to find a record; each record
//! has its own mutex, so health updates for different subscriptions proceed
//! in parallel.

use super::{RegistryError, SubscriptionRegistry};
use crate::{
    events::EventType,
    subscription::{HealthTransition, HealthUpdate, NewSubscription, Subscription, SubscriptionStatus},
    SubscriptionId,
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};
use tracing::debug;

type Record = Arc<Mutex<Subscription>>;

/// Thread-safe in-memory subscription store
#[derive(Clone, Default)]
pub struct InMemorySubscriptionRegistry {
    records: Arc<RwLock<HashMap<SubscriptionId, Record>>>,
}

impl InMemorySubscriptionRegistry {
    /// Create new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, id: SubscriptionId) -> Result<Option<Record>, RegistryError> {
        let records = self.records.read().map_err(|_| poisoned("registry"))?;
        Ok(records.get(&id).cloned())
    }

    fn snapshot(&self) -> Result<Vec<Record>, RegistryError> {
        let records = self.records.read().map_err(|_| poisoned("registry"))?;
        Ok(records.values().cloned().collect())
    }
}

fn poisoned(what: &str) -> RegistryError {
    RegistryError::Storage {
        message: format!("{} lock poisoned", what),
    }
}

fn read_record(record: &Record) -> Result<Subscription, RegistryError> {
    record
        .lock()
        .map(|subscription| subscription.clone())
        .map_err(|_| poisoned("subscription"))
}

#[async_trait]
impl SubscriptionRegistry for InMemorySubscriptionRegistry {
    async fn register(&self, input: NewSubscription) -> Result<Subscription, RegistryError> {
        let subscription = Subscription::new(input);

        let mut records = self.records.write().map_err(|_| poisoned("registry"))?;
        records.insert(subscription.id, Arc::new(Mutex::new(subscription.clone())));

        debug!(
            subscription_id = %subscription.id,
            endpoint = %subscription.endpoint,
            "Subscription registered"
        );
        Ok(subscription)
    }

    async fn list(&self) -> Result<Vec<Subscription>, RegistryError> {
        self.snapshot()?.iter().map(read_record).collect()
    }

    async fn get(&self, id: SubscriptionId) -> Result<Option<Subscription>, RegistryError> {
        self.record(id)?.as_ref().map(read_record).transpose()
    }

    async fn remove(&self, id: SubscriptionId) -> Result<bool, RegistryError> {
        let mut records = self.records.write().map_err(|_| poisoned("registry"))?;
        Ok(records.remove(&id).is_some())
    }

    async fn set_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
    ) -> Result<bool, RegistryError> {
        let Some(record) = self.record(id)? else {
            return Ok(false);
        };

        let mut subscription = record.lock().map_err(|_| poisoned("subscription"))?;
        subscription.apply_operator_status(status)?;
        Ok(true)
    }

    async fn matching(&self, event_type: EventType) -> Result<Vec<Subscription>, RegistryError> {
        let mut matches = Vec::new();
        for record in self.snapshot()? {
            let subscription = record.lock().map_err(|_| poisoned("subscription"))?;
            if subscription.matches(event_type) {
                matches.push(subscription.clone());
            }
        }
        Ok(matches)
    }

    async fn apply_health_update(
        &self,
        id: SubscriptionId,
        update: HealthUpdate,
    ) -> Result<Option<HealthTransition>, RegistryError> {
        let Some(record) = self.record(id)? else {
            return Ok(None);
        };

        let mut subscription = record.lock().map_err(|_| poisoned("subscription"))?;
        Ok(Some(subscription.apply_health_update(update)))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
