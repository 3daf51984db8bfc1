//! # Event Recorder
//!
//! Single write path for SystemEvents: every event is published on the
//! in-process bus and appended to the durable `system_events` log. When the
//! store is unreachable the durable copy is buffered and flushed after the
//! store heals, so a persistence outage never silences the audit trail or
//! crashes a control-loop tick. A configured run of consecutive store
//! failures is escalated exactly once as a CRITICAL `persistence_degraded`
//! event.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, warn};

use crate::constants::event_types;
use crate::database::store::CoordinationStore;
use crate::events::publisher::EventPublisher;
use crate::models::core::system_event::{EventSeverity, NewSystemEvent};
use crate::resilience::retry::{with_retry, RetryPolicy, StoreHealth};

// Buffered events are dropped oldest-first past this bound.
const MAX_BUFFERED_EVENTS: usize = 10_000;

pub struct EventRecorder {
    publisher: EventPublisher,
    store: Arc<dyn CoordinationStore>,
    retry: RetryPolicy,
    health: Arc<StoreHealth>,
    buffer: Mutex<Vec<NewSystemEvent>>,
}

impl EventRecorder {
    pub fn new(
        publisher: EventPublisher,
        store: Arc<dyn CoordinationStore>,
        retry: RetryPolicy,
        health: Arc<StoreHealth>,
    ) -> Self {
        Self {
            publisher,
            store,
            retry,
            health,
            buffer: Mutex::new(Vec::new()),
        }
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn store_health(&self) -> &StoreHealth {
        &self.health
    }

    /// Publish and persist an event. Infallible by contract: persistence
    /// failures degrade to buffering, never to a caller-visible error.
    pub async fn record(&self, event: NewSystemEvent) {
        if let Err(err) = self.publisher.publish(event.clone()) {
            warn!(event_type = %event.event_type, error = %err, "event publish failed");
        }

        match with_retry(&self.retry, "append_event", || {
            let store = self.store.clone();
            let event = event.clone();
            async move { store.append_event(&event).await }
        })
        .await
        {
            Ok(()) => {
                self.health.record_success();
                self.flush_buffered().await;
            }
            Err(err) => {
                warn!(
                    event_type = %event.event_type,
                    error = %err,
                    "event persistence failed, buffering"
                );
                self.buffer_event(event);

                if self.health.record_failure() {
                    error!(
                        threshold = self.health.consecutive_failures(),
                        "persistence layer degraded, escalating"
                    );
                    let degraded = NewSystemEvent::new(
                        event_types::PERSISTENCE_DEGRADED,
                        EventSeverity::Critical,
                        Utc::now(),
                    )
                    .with_context(serde_json::json!({
                        "consecutive_failures": self.health.consecutive_failures(),
                    }));
                    let _ = self.publisher.publish(degraded.clone());
                    self.buffer_event(degraded);
                }
            }
        }
    }

    /// Drain the buffer into the store, stopping at the first failure (the
    /// remainder stays buffered for the next healthy write).
    pub async fn flush_buffered(&self) {
        loop {
            let next = {
                let mut buffer = self.buffer.lock();
                if buffer.is_empty() {
                    return;
                }
                buffer.remove(0)
            };

            if let Err(err) = self.store.append_event(&next).await {
                warn!(error = %err, "buffered event flush interrupted");
                let mut buffer = self.buffer.lock();
                buffer.insert(0, next);
                return;
            }
        }
    }

    pub fn buffered_count(&self) -> usize {
        self.buffer.lock().len()
    }

    fn buffer_event(&self, event: NewSystemEvent) {
        let mut buffer = self.buffer.lock();
        if buffer.len() >= MAX_BUFFERED_EVENTS {
            buffer.remove(0);
        }
        buffer.push(event);
    }
}
