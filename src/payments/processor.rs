//! Effect application for verified events.

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;

use crate::payments::types::Event;

#[derive(Debug, Error)]
pub enum EffectError {
    #[error("event {event_id} ({event_type}) is missing field `{field}`")]
    MissingField {
        event_id: String,
        event_type: String,
        field: &'static str,
    },

    #[error("effect failed: {0}")]
    Failed(String),
}

/// Downstream consumer of verified, deduplicated events.
///
/// Called at most once per event id while the id stays in the idempotency
/// record. An `Err` causes a 500 and lets the provider redeliver.
pub trait EventHandler: Send + Sync {
    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), EffectError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    pub status: SubscriptionStatus,
    pub subscription_id: Option<String>,
    /// Event id that produced this state.
    pub last_event: String,
}

/// Default handler: keeps customer -> subscription state in memory.
#[derive(Default)]
pub struct SubscriptionUpdater {
    subscriptions: DashMap<String, SubscriptionInfo>,
}

impl SubscriptionUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, customer: &str) -> Option<SubscriptionInfo> {
        self.subscriptions.get(customer).map(|r| r.value().clone())
    }

    pub fn count(&self) -> usize {
        self.subscriptions.len()
    }

    /// (active, inactive)
    pub fn summary(&self) -> (usize, usize) {
        let active = self
            .subscriptions
            .iter()
            .filter(|r| r.value().status == SubscriptionStatus::Active)
            .count();
        (active, self.subscriptions.len() - active)
    }

    fn apply(&self, event: &Event) -> Result<(), EffectError> {
        let status = match event.event_type.as_str() {
            "checkout.session.completed"
            | "customer.subscription.created"
            | "customer.subscription.updated" => SubscriptionStatus::Active,
            "customer.subscription.deleted" => SubscriptionStatus::Canceled,
            "invoice.payment_failed" => SubscriptionStatus::PastDue,
            other => {
                tracing::debug!(event_id = %event.id, event_type = other, "Ignoring unhandled event type");
                return Ok(());
            }
        };

        let object = event.object();
        let customer = object
            .and_then(|o| o.get("customer"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| EffectError::MissingField {
                event_id: event.id.clone(),
                event_type: event.event_type.clone(),
                field: "data.object.customer",
            })?;
        let subscription_id = object
            .and_then(|o| match event.event_type.as_str() {
                "checkout.session.completed" | "invoice.payment_failed" => o.get("subscription"),
                _ => o.get("id"),
            })
            .and_then(|s| s.as_str())
            .map(str::to_string);

        self.subscriptions.insert(
            customer.to_string(),
            SubscriptionInfo {
                status,
                subscription_id,
                last_event: event.id.clone(),
            },
        );
        tracing::info!(
            event_id = %event.id,
            customer,
            status = ?status,
            "Subscription updated"
        );
        Ok(())
    }
}

impl EventHandler for SubscriptionUpdater {
    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), EffectError>> {
        Box::pin(async move { self.apply(event) })
    }
}
