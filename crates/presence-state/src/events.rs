use presence_core::constants::EVENT_BUS_CAPACITY;
use presence_core::event::{PresenceEvent, Topic};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{trace, warn};

/// Fan-out of presence events to any number of subscribers.
///
/// Emitting never waits on a subscriber: a reader that falls more than
/// `capacity` events behind skips the oldest ones.
pub struct EventBus {
    sender: broadcast::Sender<PresenceEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: PresenceEvent) {
        trace!(kind = event.kind(), epoch_id = %event.epoch_id(), "emitting presence event");
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        Subscription {
            topic,
            receiver: self.sender.subscribe(),
        }
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

/// A filtered view of the bus. Dropping it cancels the subscription.
pub struct Subscription {
    topic: Topic,
    receiver: broadcast::Receiver<PresenceEvent>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Wait for the next matching event. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<PresenceEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.topic.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(topic = ?self.topic, skipped, "subscriber lagged; events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already buffered, without waiting.
    pub fn try_next(&mut self) -> Option<PresenceEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.topic.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(topic = ?self.topic, skipped, "subscriber lagged; events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Every matching event currently buffered.
    pub fn drain(&mut self) -> Vec<PresenceEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Consume into a `Stream` of matching events.
    pub fn into_stream(self) -> impl Stream<Item = PresenceEvent> + Send + Unpin {
        let topic = self.topic;
        BroadcastStream::new(self.receiver).filter_map(move |item| match item {
            Ok(event) if topic.matches(&event) => Some(event),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(?topic, skipped, "subscriber lagged; events dropped");
                None
            }
        })
    }
}
