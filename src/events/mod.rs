pub mod publisher;
pub mod recorder;

// Re-export key types for convenience
pub use publisher::{EventPublisher, PublishError, PublishedEvent};
pub use recorder::EventRecorder;
