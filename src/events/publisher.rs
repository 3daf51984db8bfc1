use tokio::sync::broadcast;

use crate::models::core::system_event::NewSystemEvent;

/// In-process event bus for coordination lifecycle events. Dashboards and
/// tests subscribe; publishing never blocks on slow subscribers.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event as seen by subscribers.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event: NewSystemEvent,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. A bus with no
    /// subscribers accepts the publish and drops it; the durable copy lives
    /// in the system_events log, not here.
    pub fn publish(&self, event: NewSystemEvent) -> Result<(), PublishError> {
        let published = PublishedEvent {
            event,
            published_at: chrono::Utc::now(),
        };

        match self.sender.send(published) {
            Ok(_) => Ok(()),
            Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Error types for event publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event channel is closed")]
    ChannelClosed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
