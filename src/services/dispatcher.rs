//! Subscription index and notification dispatcher.
//!
//! Maps change events to the interested, eligible subscribers and emits
//! exactly one notification intent per (subscriber, observation) within
//! the suppression window. The dispatcher decides *that* and *what* to
//! send; rendering and transport belong to the delivery collaborator.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::models::{
    dedup_key, ChangeEvent, ChangeKind, DispatcherConfig, NotificationIntent,
    WatchlistSubscription,
};

/// Query view of which agencies watch one circuit.
#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    subscriptions: Vec<WatchlistSubscription>,
}

impl SubscriptionIndex {
    pub fn new(subscriptions: Vec<WatchlistSubscription>) -> Self {
        Self { subscriptions }
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Subscriptions whose preference flags cover this event.
    ///
    /// Status changes only count as availability news when the departure
    /// enters or leaves `cancelled`; other status churn has no
    /// corresponding preference and is notified to nobody.
    pub fn eligible<'a>(&'a self, event: &'a ChangeEvent) -> impl Iterator<Item = &'a WatchlistSubscription> {
        self.subscriptions
            .iter()
            .filter(move |sub| match event.kind {
                ChangeKind::AvailabilityDecreased
                | ChangeKind::AvailabilityIncreased
                | ChangeKind::BecameFull
                | ChangeKind::BecameAvailable
                | ChangeKind::CapacityChanged => sub.notify_on_availability_change,
                ChangeKind::StatusChanged => {
                    sub.notify_on_availability_change && event.touches_cancelled()
                }
                ChangeKind::PriceChanged => sub.notify_on_price_change,
                ChangeKind::NewBooking => sub.notify_on_booking,
            })
    }
}

/// Outcome reported by the delivery collaborator for one intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Sent,
    Failed { error: String },
}

/// The external collaborator that renders and sends notifications.
///
/// The engine never retries a failed delivery; the collaborator owns
/// that. A failure does not re-arm the suppression window either, so a
/// repeated detection of the same observation stays suppressed.
#[async_trait]
pub trait NotificationDelivery: Send + Sync {
    async fn deliver(&self, intent: &NotificationIntent) -> DeliveryResult;
}

/// Delivery backend that only logs, for stand-alone runs.
pub struct LogDelivery;

#[async_trait]
impl NotificationDelivery for LogDelivery {
    async fn deliver(&self, intent: &NotificationIntent) -> DeliveryResult {
        log::info!(
            "notify {}: {} on departure {} ({} -> {})",
            intent.agency_id,
            intent.event.kind,
            intent.event.departure_id,
            intent.event.old,
            intent.event.new,
        );
        DeliveryResult::Sent
    }
}

/// Counts for one dispatch cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Intents handed to the delivery collaborator
    pub emitted: usize,
    /// Of those, deliveries reported as sent
    pub sent: usize,
    /// Intents dropped by the suppression window
    pub suppressed: usize,
}

/// Fans change events out to eligible subscribers with dedup suppression.
pub struct NotificationDispatcher {
    window: Duration,
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl NotificationDispatcher {
    pub fn new(config: &DispatcherConfig) -> Self {
        Self {
            window: Duration::seconds(config.suppression_window_secs as i64),
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Dispatch a batch of events for one departure/circuit.
    ///
    /// At most one intent leaves per distinct dedup key within the
    /// suppression window, however many sync cycles re-observe the same
    /// value in between.
    pub async fn dispatch(
        &self,
        events: &[ChangeEvent],
        index: &SubscriptionIndex,
        delivery: &dyn NotificationDelivery,
        now: DateTime<Utc>,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for event in events {
            for subscription in index.eligible(event) {
                let key = dedup_key(&subscription.agency_id, event);

                {
                    let mut seen = self.seen.lock().await;
                    seen.retain(|_, armed_at| now - *armed_at < self.window);
                    if seen.contains_key(&key) {
                        log::debug!("suppressed duplicate notification {key}");
                        summary.suppressed += 1;
                        continue;
                    }
                    // Armed at emission; a failed send never re-arms it
                    seen.insert(key.clone(), now);
                }

                let intent = NotificationIntent {
                    agency_id: subscription.agency_id.clone(),
                    dedup_key: key,
                    event: event.clone(),
                };

                summary.emitted += 1;
                match delivery.deliver(&intent).await {
                    DeliveryResult::Sent => summary.sent += 1,
                    DeliveryResult::Failed { error } => {
                        log::warn!(
                            "delivery failed for {} (key {}): {}",
                            intent.agency_id,
                            intent.dedup_key,
                            error
                        );
                    }
                }
            }
        }

        summary
    }
}
