//! Subscriber registry for change notifications.
//!
//! A subscriber is a [`ChangeStream`] handed out by the engine. The registry
//! keeps the sending half of each stream's channel and fans every committed
//! batch out to all of them.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::trace;

use super::event::{ChangeBatch, ChangeStream};

/// Unique identifier for a subscriber.
///
/// Uses an atomic counter so ids stay unique across engines and threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// The live subscriptions of one engine.
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    senders: Mutex<Vec<(SubscriberId, UnboundedSender<ChangeBatch>)>>,
}

impl Subscribers {
    pub(crate) fn subscribe(&self) -> ChangeStream {
        let id = SubscriberId::new();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.senders.lock().push((id, sender));
        ChangeStream::new(id, receiver)
    }

    /// Deliver a batch to every live subscriber, dropping closed ones.
    pub(crate) fn dispatch(&self, batch: &ChangeBatch) {
        let mut senders = self.senders.lock();
        senders.retain(|(id, sender)| {
            let delivered = sender.send(batch.clone()).is_ok();
            if !delivered {
                trace!(subscriber = ?id, "dropping closed subscriber");
            }
            delivered
        });
    }

    /// Number of subscribers whose stream is still alive.
    pub(crate) fn len(&self) -> usize {
        let mut senders = self.senders.lock();
        senders.retain(|(_, sender)| !sender.is_closed());
        senders.len()
    }
}
