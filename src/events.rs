//! Event Bus (C10)
//!
//! In-process broadcast of structured events to the event log and the
//! notification sink. Grounded in `events/bus.rs`'s broadcast-channel
//! wrapper; generalized from server lifecycle events to the healing
//! events of spec §3, and augmented with an overflow counter since §4.10
//! requires dropped events to be counted, not silently discarded.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Kind of healing event, per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Restart,
    Quarantine,
    AutoUnquarantine,
    AutoMonitor,
    ExternalRestart,
    HealthCheckFailed,
}

/// Outcome recorded alongside an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Success,
    Failure,
    Quarantined,
    Enabled,
}

/// A single append-only event (spec §3), capped in the ring by C2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub stable_id: String,
    pub container_name: String,
    pub kind: EventKind,
    pub restart_count: u32,
    pub status: EventStatus,
    pub message: String,
}

impl Event {
    pub fn new(
        stable_id: impl Into<String>,
        container_name: impl Into<String>,
        kind: EventKind,
        restart_count: u32,
        status: EventStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            stable_id: stable_id.into(),
            container_name: container_name.into(),
            kind,
            restart_count,
            status,
            message: message.into(),
        }
    }
}

/// Broadcasts events to the event log and the notification sink.
///
/// Subscribers that fall behind drop the oldest events they missed
/// (`RecvError::Lagged`); the sink subscription filters by an event-kind
/// allowlist at the call site, not inside the bus itself, keeping the bus
/// a narrow pub/sub primitive.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    _receiver: broadcast::Receiver<Event>,
    dropped: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self {
            sender,
            _receiver,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish an event. If there are no subscribers it is silently
    /// dropped (that's not an overflow); an overflow only happens when a
    /// lagging subscriber misses events, which the subscriber itself
    /// detects on `recv()`.
    pub fn publish(&self, event: Event) -> usize {
        let receivers = self.sender.send(event).unwrap_or(0);
        debug!(receivers, "published event");
        receivers
    }

    /// Record that a subscriber's receive loop observed a lagged gap.
    pub fn record_dropped(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Record an event in both places C10 dispatches to (§4.10): the
/// persisted ring owned by C2, and the broadcast bus any notification
/// sink subscribes to. Every component that raises an event goes through
/// this single entry point so the two never drift apart.
pub fn emit(store: &crate::store::StateStore, bus: &EventBus, event: Event) {
    store.add_event(event.clone());
    bus.publish(event);
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            _receiver: self.sender.subscribe(),
            dropped: AtomicU64::new(self.dropped.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(Event::new(
            "app_api",
            "api-1",
            EventKind::Restart,
            1,
            EventStatus::Success,
            "exit:137",
        ));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.stable_id, "app_api");
        assert!(matches!(event.kind, EventKind::Restart));
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(Event::new(
            "app_api",
            "api-1",
            EventKind::Quarantine,
            3,
            EventStatus::Quarantined,
            "max restarts reached",
        ));

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[test]
    fn subscriber_count_tracks_subscriptions() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn dropped_events_are_counted_not_lost_silently() {
        let bus = EventBus::new();
        bus.record_dropped(3);
        assert_eq!(bus.dropped_count(), 3);
    }
}
