//! Events emitted by the core for UI and notification layers.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use crate::{ContentId, Image, InsertError};

/// Lifecycle of an image insert.
///
/// Every insert emits `ImageInsertStarted` first and then exactly one of the
/// other three.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoreEvent {
    ImageInsertStarted { image: Image },
    ImageInsertAborted { image: Image },
    ImageInsertFailed { image: Image, error: InsertError },
    ImageInsertFinished { image: Image, id: Option<ContentId> },
}

impl CoreEvent {
    pub fn image(&self) -> &Image {
        match self {
            CoreEvent::ImageInsertStarted { image }
            | CoreEvent::ImageInsertAborted { image }
            | CoreEvent::ImageInsertFailed { image, .. }
            | CoreEvent::ImageInsertFinished { image, .. } => image,
        }
    }
}

/// Receives [`CoreEvent`]s. Called from whatever thread produced the event.
pub trait EventSink: Send + Sync {
    fn post(&self, event: CoreEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn post(&self, event: CoreEvent) {
        (**self).post(event)
    }
}

/// Broadcasting [`EventSink`]: every subscriber sees every event posted
/// after it subscribed.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventSink for EventBus {
    fn post(&self, event: CoreEvent) {
        if let Err(err) = self.tx.send(event) {
            trace!("dropping event without subscribers: {:?}", err.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_delivers_to_subscribers() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let image = Image::new("image-id");

        bus.post(CoreEvent::ImageInsertStarted {
            image: image.clone(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event, CoreEvent::ImageInsertStarted { image });
    }

    #[test]
    fn posting_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.post(CoreEvent::ImageInsertAborted {
            image: Image::new("image-id"),
        });
    }
}
