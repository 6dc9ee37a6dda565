//! Event bus over a tokio broadcast channel.
//!
//! Slow subscribers miss events rather than blocking the pipeline.

use crate::events::PipelineEvent;
use tokio::sync::broadcast;

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out of [`PipelineEvent`]s to any number of subscribers.
///
/// Cloning shares the underlying channel.
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus with custom capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Publish an event. Never blocks; dropped when nobody listens.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Receiving end of an [`EventBus`].
pub struct EventSubscriber {
    receiver: broadcast::Receiver<PipelineEvent>,
}

impl EventSubscriber {
    /// Next event, or `None` once every bus handle is dropped.
    ///
    /// Lagging is logged and skipped over.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Pipeline event subscriber lagged");
                }
            }
        }
    }

    /// Next event about one document.
    pub async fn recv_for(&mut self, document_id: &str) -> Option<PipelineEvent> {
        loop {
            let event = self.recv().await?;
            if event.document_id() == document_id {
                return Some(event);
            }
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<PipelineEvent> {
        self.receiver.try_recv().ok()
    }
}
