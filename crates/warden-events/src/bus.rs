//! Event bus for broadcasting pipeline events to subscribers.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::message::BusEvent;

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Event bus for broadcasting events to all subscribers.
///
/// Built on a tokio broadcast channel: events are delivered in order to
/// every live receiver. Topic-filtered receivers are additionally counted
/// per topic, so a publisher can ask whether anyone is listening on a topic
/// before publishing — the confirmation driver uses this to auto-deny
/// requests when no UI has subscribed.
#[derive(Debug)]
pub struct EventBus {
    /// Sender for broadcasting events.
    sender: broadcast::Sender<Arc<BusEvent>>,
    /// Live topic-filtered receiver counts, keyed by topic.
    topic_counts: Arc<DashMap<String, usize>>,
    /// Channel capacity.
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            topic_counts: Arc::new(DashMap::new()),
            capacity,
        }
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of receivers the event was delivered to.
    pub fn publish(&self, event: BusEvent) -> usize {
        let event = Arc::new(event);

        trace!(topic = %event.topic(), "Publishing event");

        if let Ok(count) = self.sender.send(Arc::clone(&event)) {
            debug!(topic = %event.topic(), receiver_count = count, "Event published");
            count
        } else {
            // No receivers - this is fine
            trace!(topic = %event.topic(), "No receivers for event");
            0
        }
    }

    /// Subscribe to all events.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), None, Arc::clone(&self.topic_counts))
    }

    /// Subscribe to events on a single topic.
    ///
    /// The subscription is counted in [`EventBus::topic_subscribers`] until
    /// the returned receiver is dropped.
    #[must_use]
    pub fn subscribe_topic(&self, topic: impl Into<String>) -> EventReceiver {
        let topic = topic.into();
        self.topic_counts
            .entry(topic.clone())
            .and_modify(|c| *c = c.saturating_add(1))
            .or_insert(1);
        EventReceiver::new(
            self.sender.subscribe(),
            Some(topic),
            Arc::clone(&self.topic_counts),
        )
    }

    /// The number of live topic-filtered subscribers for a topic.
    #[must_use]
    pub fn topic_subscribers(&self, topic: &str) -> usize {
        self.topic_counts.get(topic).map_or(0, |c| *c)
    }

    /// The total number of live receivers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// The channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        // A clone shares the same channel and topic accounting.
        Self {
            sender: self.sender.clone(),
            topic_counts: Arc::clone(&self.topic_counts),
            capacity: self.capacity,
        }
    }
}

/// Receiver for events from the event bus.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<BusEvent>>,
    /// Topic filter; `None` receives everything.
    topic: Option<String>,
    /// Shared accounting, decremented on drop.
    topic_counts: Arc<DashMap<String, usize>>,
}

impl EventReceiver {
    fn new(
        receiver: broadcast::Receiver<Arc<BusEvent>>,
        topic: Option<String>,
        topic_counts: Arc<DashMap<String, usize>>,
    ) -> Self {
        Self {
            receiver,
            topic,
            topic_counts,
        }
    }

    /// Check if an event passes this receiver's topic filter.
    fn matches(&self, event: &BusEvent) -> bool {
        self.topic.as_ref().is_none_or(|t| event.topic() == t)
    }

    /// Receive the next matching event.
    ///
    /// Returns `None` once the channel is closed. Lagged receivers skip the
    /// dropped events and keep receiving.
    pub async fn recv(&mut self) -> Option<Arc<BusEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                },
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive the next matching event without blocking.
    pub fn try_recv(&mut self) -> Option<Arc<BusEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                },
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        if let Some(topic) = &self.topic
            && let Some(mut count) = self.topic_counts.get_mut(topic)
        {
            *count = count.saturating_sub(1);
        }
    }
}
