//! Fan-out of [`ProgressEvent`]s to every live subscriber.
//!
//! Each subscriber owns a bounded channel. Publishing never awaits a
//! subscriber: delivery uses `try_send`, and a subscriber whose channel is
//! closed or full is unregistered on the spot. One slow or vanished
//! consumer therefore cannot delay the producer or the other consumers.

use std::collections::HashMap;

use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use sculpt_core::types::Timestamp;

use crate::event::ProgressEvent;

/// Default per-subscriber buffer, in events.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

/// Identifier handed out on subscription.
pub type SubscriberId = Uuid;

/// Registry entry for one subscriber.
struct Subscriber {
    sender: mpsc::Sender<ProgressEvent>,
    connected_at: Timestamp,
}

/// Receiving half of a subscription.
///
/// Dropping it is enough to disconnect: the next publish notices the closed
/// channel and unregisters the subscriber.
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<ProgressEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. Returns `None` once the broadcaster has
    /// unregistered this subscriber and the buffer is drained.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Result<ProgressEvent, TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Registry of subscriber channels plus a non-blocking publish loop.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared by every job monitor and transport connection.
pub struct Broadcaster {
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    capacity: usize,
}

impl Broadcaster {
    /// Create a broadcaster with the default per-subscriber buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Create a broadcaster whose subscribers buffer at most `capacity`
    /// undelivered events before being dropped as too slow.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber.
    pub async fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();
        let subscriber = Subscriber {
            sender,
            connected_at: chrono::Utc::now(),
        };
        self.subscribers.write().await.insert(id, subscriber);
        tracing::debug!(subscriber = %id, "Subscriber registered");
        Subscription { id, receiver }
    }

    /// Unregister a subscriber. Unknown ids are a no-op.
    pub async fn unsubscribe(&self, id: SubscriberId) {
        if let Some(subscriber) = self.subscribers.write().await.remove(&id) {
            let connected_secs = (chrono::Utc::now() - subscriber.connected_at).num_seconds();
            tracing::debug!(subscriber = %id, connected_secs, "Subscriber unregistered");
        }
    }

    /// Deliver `event` to every registered subscriber.
    ///
    /// Returns the number of subscribers that accepted the event. Failed
    /// deliveries unregister the subscriber and are never reported to the
    /// caller.
    pub async fn publish(&self, event: ProgressEvent) -> usize {
        let mut delivered = 0;
        let mut dropped = Vec::new();

        {
            let subscribers = self.subscribers.read().await;
            for (id, subscriber) in subscribers.iter() {
                match subscriber.sender.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            subscriber = %id,
                            capacity = self.capacity,
                            "Subscriber buffer full, dropping slow subscriber",
                        );
                        dropped.push(*id);
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(subscriber = %id, "Subscriber channel closed");
                        dropped.push(*id);
                    }
                }
            }
        }

        if !dropped.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in dropped {
                subscribers.remove(&id);
            }
        }

        delivered
    }

    /// Return the current number of registered subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Unregister every subscriber.
    ///
    /// Receivers drain what is already buffered and then observe the end of
    /// the stream. Used during graceful shutdown.
    pub async fn shutdown_all(&self) {
        let mut subscribers = self.subscribers.write().await;
        let count = subscribers.len();
        subscribers.clear();
        tracing::info!(count, "Closed all event subscriptions");
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
