//! Propagation Runtime
//!
//! This module turns a graph into a live system: it applies changes as
//! transactions, keeps them isolated from readers until commit, and tells
//! subscribers what changed.
//!
//! # Concepts
//!
//! ## Transactions
//!
//! A [`Transaction`] is one atomic propagation pass. It plans the affected
//! equations, evaluates them into a private snapshot, and either commits the
//! whole snapshot or discards it.
//!
//! ## Engine
//!
//! The [`Engine`] owns the graph and serializes transactions and structural
//! changes behind a single lock. It is the type most callers use.
//!
//! ## Change streams
//!
//! Subscribers get a [`ChangeStream`] of [`ChangeBatch`]es, one per committed
//! transaction, delivered after the commit and in commit order.

mod engine;
mod event;
mod subscriber;
mod transaction;

pub use engine::Engine;
pub use event::{ChangeBatch, ChangeEvent, ChangeStream};
pub use subscriber::SubscriberId;
pub use transaction::{Committed, Transaction, TransactionState};
