//! Change Notifications
//!
//! Every committed transaction that changed at least one value produces a
//! [`ChangeBatch`]: the events of that transaction in evaluation order. Each
//! subscriber receives its own batch through a [`ChangeStream`].
//!
//! A batch is consumed by iterating it. It cannot be rewound or replayed,
//! and it is only ever created after the commit it describes, so observers
//! never see a partially applied cascade.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;

use super::subscriber::SubscriberId;
use crate::value::Value;

/// One variable's committed change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub variable: String,
    pub old: Value,
    pub new: Value,
}

impl ChangeEvent {
    pub fn new(variable: impl Into<String>, old: impl Into<Value>, new: impl Into<Value>) -> Self {
        Self {
            variable: variable.into(),
            old: old.into(),
            new: new.into(),
        }
    }
}

/// The change events of one committed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeBatch {
    transaction: u64,
    events: Vec<ChangeEvent>,
}

impl ChangeBatch {
    pub(crate) fn new(transaction: u64, events: Vec<ChangeEvent>) -> Self {
        Self {
            transaction,
            events,
        }
    }

    /// Id of the transaction that produced these events.
    pub fn transaction(&self) -> u64 {
        self.transaction
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl IntoIterator for ChangeBatch {
    type Item = ChangeEvent;
    type IntoIter = std::vec::IntoIter<ChangeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

/// A subscription to committed changes.
///
/// Dropping the stream ends the subscription.
#[derive(Debug)]
pub struct ChangeStream {
    id: SubscriberId,
    receiver: UnboundedReceiver<ChangeBatch>,
}

impl ChangeStream {
    pub(crate) fn new(id: SubscriberId, receiver: UnboundedReceiver<ChangeBatch>) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next batch. Returns `None` once the engine is dropped and
    /// every pending batch has been received.
    pub async fn recv(&mut self) -> Option<ChangeBatch> {
        self.receiver.recv().await
    }

    /// Blocking variant of [`ChangeStream::recv`] for synchronous callers.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_recv(&mut self) -> Option<ChangeBatch> {
        self.receiver.blocking_recv()
    }

    /// Take the next batch if one is already waiting.
    pub fn try_recv(&mut self) -> Option<ChangeBatch> {
        match self.receiver.try_recv() {
            Ok(batch) => Some(batch),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Iterate over the batches already delivered, without waiting.
    pub fn drain(&mut self) -> impl Iterator<Item = ChangeBatch> + '_ {
        std::iter::from_fn(move || self.try_recv())
    }
}
