//! Channel-scoped subscription broadcaster.
//!
//! Every subscriber owns a bounded queue. Publishing snapshots the
//! subscriber set under a read lock and pushes into each queue without
//! waiting, so a slow or departed subscriber never holds up the others:
//!
//! - a full queue skips that subscriber for this message (counted as lag)
//! - a closed queue is pruned from the registry
//!
//! Dropping a [`Subscription`] unregisters it.
//!
//! ```text
//! publish(channel, item)
//!     │
//!     ├─► subscriber 1 queue ─► recv()
//!     ├─► subscriber 2 queue ─► recv()
//!     └─► subscriber 3 (gone) ─► pruned
//! ```

use crate::metrics::BroadcastMetrics;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::mpsc;

/// Default per-subscriber queue depth.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

type Registry<T> = RwLock<HashMap<String, HashMap<u64, mpsc::Sender<T>>>>;

struct Inner<T> {
    channels: Registry<T>,
    next_id: AtomicU64,
    buffer: usize,
}

impl<T> Inner<T> {
    fn unregister(&self, channel: &str, id: u64) {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let remaining = channels.get_mut(channel).map(|subscribers| {
            subscribers.remove(&id);
            subscribers.len()
        });
        if remaining == Some(0) {
            channels.remove(channel);
        }
        BroadcastMetrics::record_subscribers(channel, remaining.unwrap_or(0));
    }
}

/// Fans published items out to every current subscriber of a channel.
///
/// Cheap to clone; clones share the same registry.
///
/// # Example
///
/// ```
/// use status_relay_runtime::broadcast::SubscriptionBroadcaster;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let broadcaster = SubscriptionBroadcaster::<String>::new();
/// let mut subscription = broadcaster.subscribe("onStatusUpdate");
///
/// let delivered = broadcaster.publish("onStatusUpdate", "hello".to_string());
/// assert_eq!(delivered, 1);
/// assert_eq!(subscription.recv().await.as_deref(), Some("hello"));
/// # }
/// ```
pub struct SubscriptionBroadcaster<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SubscriptionBroadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for SubscriptionBroadcaster<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionBroadcaster")
            .field("buffer", &self.inner.buffer)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> Default for SubscriptionBroadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> SubscriptionBroadcaster<T> {
    /// Broadcaster with the default per-subscriber buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    /// Broadcaster whose subscribers each buffer up to `buffer` items.
    #[must_use]
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                channels: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Register a new subscriber on `channel`.
    ///
    /// The subscriber sees only items published after this call.
    #[must_use]
    pub fn subscribe(&self, channel: impl Into<String>) -> Subscription<T> {
        let channel = channel.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.buffer);

        let count = {
            let mut channels = self
                .inner
                .channels
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let subscribers = channels.entry(channel.clone()).or_default();
            subscribers.insert(id, tx);
            subscribers.len()
        };

        BroadcastMetrics::record_subscribers(&channel, count);
        tracing::debug!(channel = %channel, subscriber_id = id, "Subscriber registered");

        Subscription {
            id,
            channel,
            receiver: rx,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Push `item` to every subscriber of `channel`.
    ///
    /// Returns the number of subscribers the item was queued for. Zero
    /// subscribers is not an error.
    pub fn publish(&self, channel: &str, item: T) -> usize {
        let subscribers: Vec<(u64, mpsc::Sender<T>)> = {
            let channels = self
                .inner
                .channels
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            channels
                .get(channel)
                .map(|subs| subs.iter().map(|(id, tx)| (*id, tx.clone())).collect())
                .unwrap_or_default()
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, tx) in subscribers {
            match tx.try_send(item.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    BroadcastMetrics::record_lagged(channel);
                    tracing::warn!(channel, subscriber_id = id, "Subscriber lagging, message skipped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id),
            }
        }

        for id in closed {
            tracing::debug!(channel, subscriber_id = id, "Pruning disconnected subscriber");
            self.inner.unregister(channel, id);
        }

        BroadcastMetrics::record_broadcast(channel);
        tracing::debug!(channel, delivered, "Broadcast complete");
        delivered
    }

    /// Current subscriber count on `channel`.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(channel)
            .map_or(0, HashMap::len)
    }
}

/// One subscriber's receiving end.
///
/// Dropping it removes the subscriber from the broadcaster.
pub struct Subscription<T> {
    id: u64,
    channel: String,
    receiver: mpsc::Receiver<T>,
    registry: Weak<Inner<T>>,
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl<T> Subscription<T> {
    /// Subscriber identifier, unique within its broadcaster.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Channel this subscription listens on.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next item.
    ///
    /// Returns `None` once the broadcaster is gone and the buffer is drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take the next item if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            inner.unregister(&self.channel, self.id);
            tracing::debug!(channel = %self.channel, subscriber_id = self.id, "Subscriber unregistered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANNEL: &str = "onStatusUpdate";

    #[tokio::test]
    async fn every_subscriber_receives_each_item() {
        let broadcaster = SubscriptionBroadcaster::<u32>::new();
        let mut a = broadcaster.subscribe(CHANNEL);
        let mut b = broadcaster.subscribe(CHANNEL);

        assert_eq!(broadcaster.publish(CHANNEL, 7), 2);

        assert_eq!(a.recv().await, Some(7));
        assert_eq!(b.recv().await, Some(7));
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let broadcaster = SubscriptionBroadcaster::<u32>::new();
        assert_eq!(broadcaster.publish(CHANNEL, 1), 0);
    }

    #[test]
    fn channels_are_isolated() {
        let broadcaster = SubscriptionBroadcaster::<u32>::new();
        let mut other = broadcaster.subscribe("other");

        broadcaster.publish(CHANNEL, 1);

        assert_eq!(other.try_recv(), None);
    }

    #[test]
    fn late_subscribers_miss_earlier_items() {
        let broadcaster = SubscriptionBroadcaster::<u32>::new();
        broadcaster.publish(CHANNEL, 1);

        let mut late = broadcaster.subscribe(CHANNEL);
        assert_eq!(late.try_recv(), None);
    }

    #[test]
    fn dropping_a_subscription_unregisters_it() {
        let broadcaster = SubscriptionBroadcaster::<u32>::new();
        let first = broadcaster.subscribe(CHANNEL);
        let _second = broadcaster.subscribe(CHANNEL);
        assert_eq!(broadcaster.subscriber_count(CHANNEL), 2);

        drop(first);
        assert_eq!(broadcaster.subscriber_count(CHANNEL), 1);
    }

    #[test]
    fn full_subscriber_does_not_block_others() {
        let broadcaster = SubscriptionBroadcaster::<u32>::with_buffer(1);
        let mut slow = broadcaster.subscribe(CHANNEL);
        let mut fast = broadcaster.subscribe(CHANNEL);

        assert_eq!(broadcaster.publish(CHANNEL, 1), 2);
        assert_eq!(fast.try_recv(), Some(1));

        // slow still holds item 1, so item 2 skips it
        assert_eq!(broadcaster.publish(CHANNEL, 2), 1);
        assert_eq!(fast.try_recv(), Some(2));
        assert_eq!(slow.try_recv(), Some(1));
        assert_eq!(slow.try_recv(), None);
    }

    #[test]
    fn subscription_outliving_broadcaster_is_harmless() {
        let broadcaster = SubscriptionBroadcaster::<u32>::new();
        let mut subscription = broadcaster.subscribe(CHANNEL);
        drop(broadcaster);

        assert_eq!(subscription.try_recv(), None);
        drop(subscription);
    }
}
