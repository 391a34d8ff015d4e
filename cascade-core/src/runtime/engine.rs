//! Propagation Engine
//!
//! The engine is the entry point that ties the graph, the scheduler, and
//! transactions together behind one exclusion boundary.
//!
//! # How It Works
//!
//! 1. Structural changes (`declare_*`, `remove_equation`) take the write lock.
//!
//! 2. A change transaction takes an upgradable read lock. Only one upgradable
//!    lock exists at a time, so transactions are serialized against each other
//!    and against structural changes, while plain readers keep seeing the last
//!    committed state during evaluation.
//!
//! 3. After a successful evaluation the lock is upgraded to a write lock and
//!    the working snapshot is committed in one step.
//!
//! 4. The lock is then downgraded to upgradable and the change batch is
//!    dispatched. Readers already see the commit, and the next transaction
//!    cannot start until dispatch is done, so subscribers receive batches in
//!    commit order.
//!
//! # Thread Safety
//!
//! `Engine` is `Send + Sync`; share it behind an `Arc`. Waiting for the lock
//! blocks unless `EngineConfig::lock_timeout_ms` is set, in which case a wait
//! that runs out fails with `GraphError::ConcurrentTransaction`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard, RwLockWriteGuard};
use tracing::{debug, info_span, warn};

use super::event::ChangeStream;
use super::subscriber::Subscribers;
use super::transaction::{Committed, Transaction};
use crate::compute::Compute;
use crate::config::EngineConfig;
use crate::error::{GraphError, Result};
use crate::graph::{EquationRef, Graph, Scheduler, VariableRef};
use crate::value::{Signature, Value};

/// A dependency-propagation engine over one graph.
pub struct Engine {
    graph: RwLock<Graph>,
    config: EngineConfig,
    subscribers: Subscribers,

    /// Next transaction id. Only advanced while holding the exclusion
    /// boundary, so ids increase in commit order.
    next_transaction: AtomicU64,
}

impl Engine {
    /// Create an engine over an empty graph with default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            graph: RwLock::new(Graph::new()),
            config,
            subscribers: Subscribers::default(),
            next_transaction: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Exclusion boundary
    // ------------------------------------------------------------------

    fn write(&self) -> Result<RwLockWriteGuard<'_, Graph>> {
        match self.config.lock_timeout() {
            None => Ok(self.graph.write()),
            Some(timeout) => self.graph.try_write_for(timeout).ok_or_else(|| {
                warn!(?timeout, "timed out waiting for structural lock");
                GraphError::ConcurrentTransaction
            }),
        }
    }

    fn upgradable(&self) -> Result<RwLockUpgradableReadGuard<'_, Graph>> {
        match self.config.lock_timeout() {
            None => Ok(self.graph.upgradable_read()),
            Some(timeout) => self.graph.try_upgradable_read_for(timeout).ok_or_else(|| {
                warn!(?timeout, "timed out waiting for transaction lock");
                GraphError::ConcurrentTransaction
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Graph> {
        self.graph.read()
    }

    fn next_transaction_id(&self) -> u64 {
        self.next_transaction.fetch_add(1, Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Graph construction
    // ------------------------------------------------------------------

    /// Declare a source variable. Fails with `DuplicateId` if it exists.
    pub fn declare_variable(
        &self,
        id: impl Into<String>,
        initial: impl Into<Value>,
    ) -> Result<VariableRef> {
        self.write()?.declare_variable(id, initial)
    }

    /// Declare an equation computing `output` from `inputs`.
    ///
    /// With `settle_on_declare`, the new equation and everything downstream
    /// are evaluated before returning; if that evaluation fails the equation
    /// is removed again and the evaluation error returned.
    pub fn declare_equation<S, C>(
        &self,
        output: &str,
        inputs: &[S],
        compute: C,
    ) -> Result<EquationRef>
    where
        S: AsRef<str>,
        C: Compute + 'static,
    {
        let mut graph = self.write()?;
        let equation = graph.declare_equation(output, inputs, compute)?;
        self.settle_declared(graph, equation)
    }

    /// Declare an equation with declared input and output kinds.
    pub fn declare_typed_equation<S, C>(
        &self,
        output: &str,
        inputs: &[S],
        signature: Signature,
        compute: C,
    ) -> Result<EquationRef>
    where
        S: AsRef<str>,
        C: Compute + 'static,
    {
        let mut graph = self.write()?;
        let equation = graph.declare_typed_equation(output, inputs, signature, compute)?;
        self.settle_declared(graph, equation)
    }

    fn settle_declared(
        &self,
        mut graph: RwLockWriteGuard<'_, Graph>,
        equation: EquationRef,
    ) -> Result<EquationRef> {
        if !self.config.settle_on_declare {
            return Ok(equation);
        }

        let id = self.next_transaction_id();
        let _span = info_span!("transaction", id, settle = %equation.name).entered();
        let mut txn = Transaction::recompute(&graph, id, Some(&[equation.output]));
        if let Err(err) = txn.evaluate(&graph) {
            graph.remove_equation(&equation.name)?;
            return Err(err);
        }
        let (committed, batch) = txn.commit(&mut graph)?;
        debug!(changed = ?committed.changed, "settled new equation");
        if !batch.is_empty() {
            self.subscribers.dispatch(&batch);
        }
        Ok(equation)
    }

    /// Remove the equation producing `output`; `output` becomes a source.
    pub fn remove_equation(&self, output: &str) -> Result<EquationRef> {
        self.write()?.remove_equation(output)
    }

    // ------------------------------------------------------------------
    // Change submission
    // ------------------------------------------------------------------

    /// Apply a set of simultaneous source changes and propagate them.
    ///
    /// Either every resulting change is committed, or, if any equation
    /// fails, none is and `GraphError::Evaluation` names the failing output.
    pub fn submit_change<I, K, V>(&self, changes: I) -> Result<Committed>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let graph = self.upgradable()?;
        let id = self.next_transaction_id();
        let _span = info_span!("transaction", id).entered();

        let txn = Transaction::begin(&graph, id, changes)?;
        self.run(graph, txn)
    }

    /// Change a single source variable.
    pub fn set(&self, id: &str, value: impl Into<Value>) -> Result<Committed> {
        self.submit_change([(id, value.into())])
    }

    /// Evaluate every equation and commit whatever differs.
    ///
    /// Brings a graph whose derived variables were declared with placeholder
    /// values to its fixed point.
    pub fn recompute_all(&self) -> Result<Committed> {
        let graph = self.upgradable()?;
        let id = self.next_transaction_id();
        let _span = info_span!("transaction", id, recompute = true).entered();

        let txn = Transaction::recompute(&graph, id, None);
        self.run(graph, txn)
    }

    fn run(
        &self,
        graph: RwLockUpgradableReadGuard<'_, Graph>,
        mut txn: Transaction,
    ) -> Result<Committed> {
        debug!(planned = txn.plan().len(), "evaluating");
        txn.evaluate(&graph)?;

        let mut graph = RwLockUpgradableReadGuard::upgrade(graph);
        let (committed, batch) = txn.commit(&mut graph)?;
        let graph = RwLockWriteGuard::downgrade_to_upgradable(graph);

        debug!(
            changed = committed.changed.len(),
            evaluated = committed.evaluated,
            "committed"
        );
        if !batch.is_empty() {
            self.subscribers.dispatch(&batch);
        }
        drop(graph);

        Ok(committed)
    }

    /// Names of the equation outputs a change to `ids` would evaluate, in
    /// order, without evaluating anything.
    pub fn plan<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<String>> {
        let graph = self.read();
        let nodes = ids
            .iter()
            .map(|id| graph.resolve(id.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let plan = Scheduler::new(&graph).plan(nodes);
        Ok(plan
            .order()
            .iter()
            .map(|&node| graph.name_of(node).to_string())
            .collect())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Last committed value of a variable.
    pub fn get_value(&self, id: &str) -> Result<Value> {
        self.read().value(id).cloned()
    }

    /// Number of committed changes to a variable.
    pub fn get_version(&self, id: &str) -> Result<u64> {
        self.read().version(id)
    }

    pub fn is_source(&self, id: &str) -> Result<bool> {
        Ok(self.read().variable_named(id)?.is_source())
    }

    /// Names of the variables computed directly from `id`.
    pub fn dependents(&self, id: &str) -> Result<Vec<String>> {
        self.read().dependents(id)
    }

    /// Inputs of the equation producing `id`, or `None` for a source.
    pub fn producer_inputs(&self, id: &str) -> Result<Option<Vec<String>>> {
        self.read().producer_inputs(id)
    }

    /// Committed values of every variable, in declaration order.
    pub fn values(&self) -> IndexMap<String, Value> {
        self.read().values()
    }

    pub fn variable_count(&self) -> usize {
        self.read().variable_count()
    }

    pub fn equation_count(&self) -> usize {
        self.read().equation_count()
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    /// Subscribe to the change batches of future commits.
    pub fn subscribe(&self) -> ChangeStream {
        self.subscribers.subscribe()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.read();
        f.debug_struct("Engine")
            .field("variables", &graph.variable_count())
            .field("equations", &graph.equation_count())
            .field("subscribers", &self.subscribers.len())
            .field("config", &self.config)
            .finish()
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.read(), f)
    }
}
