//! In-process fan-out of "board changed" signals.
//!
//! There is a single topic for the whole process: every live viewer hears
//! every publish, whichever board it is looking at, and simply refetches.
//! Nothing here crosses process boundaries.
//!
//! Each listener holds at most one pending signal. A listener that is not
//! reading already knows it has to refetch, so further publishes are
//! dropped for it until it catches up.

use std::{
    collections::HashMap,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use chrono::Utc;
use futures::Stream;
use parking_lot::RwLock;
use shared::protocol::BoardUpdate;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

const PENDING_SIGNALS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

#[derive(Default)]
struct BusInner {
    subscribers: RwLock<HashMap<SubscriptionId, mpsc::Sender<BoardUpdate>>>,
    next_id: AtomicU64,
    next_sequence: AtomicU64,
}

impl BusInner {
    fn remove(&self, id: SubscriptionId) -> bool {
        self.subscribers.write().remove(&id).is_some()
    }
}

#[derive(Clone, Default)]
pub struct UpdateBus {
    inner: Arc<BusInner>,
}

impl UpdateBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. It receives every publish made from now until
    /// it is unsubscribed or dropped.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (sender, receiver) = mpsc::channel(PENDING_SIGNALS);
        self.inner.subscribers.write().insert(id, sender);
        debug!(subscription = id.0, "update bus subscriber registered");

        Subscription {
            id,
            receiver,
            bus: Arc::clone(&self.inner),
        }
    }

    /// Deregisters a listener by id. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.inner.remove(id);
        if removed {
            debug!(subscription = id.0, "update bus subscriber removed");
        }
        removed
    }

    /// Signals every currently registered listener. Never blocks; returns
    /// how many listeners the signal reached.
    pub fn publish(&self) -> usize {
        let update = BoardUpdate {
            sequence: self.inner.next_sequence.fetch_add(1, Ordering::SeqCst) + 1,
            published_at: Utc::now(),
        };

        let subscribers = self.inner.subscribers.read();
        let delivered = subscribers
            .values()
            .filter(|sender| match sender.try_send(update) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Closed(_)) => false,
            })
            .count();
        debug!(
            sequence = update.sequence,
            subscribers = delivered,
            "published board update"
        );
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }
}

/// A live listener handle. Dropping it deregisters the listener, so a
/// closed client connection stops receiving signals immediately.
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::Receiver<BoardUpdate>,
    bus: Arc<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<BoardUpdate> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BoardUpdate> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.bus.remove(self.id) {
            debug!(subscription = self.id.0, "update bus subscriber dropped");
        }
    }
}

impl Stream for Subscription {
    type Item = BoardUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
#[path = "tests/bus_tests.rs"]
mod tests;
