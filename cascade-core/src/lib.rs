//! Cascade Core
//!
//! This crate provides a dependency-propagation engine: a graph of named
//! values ("variables") connected by directed functional relationships
//! ("equations"). Changing a variable recomputes everything that depends on
//! it, in dependency order, until the graph is consistent again.
//!
//! It implements:
//!
//! - Graph construction with single-writer and acyclicity checks
//! - Deterministic topological scheduling of recomputation
//! - All-or-nothing change transactions
//! - Ordered change notifications delivered after commit
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: the tagged `Value` type and equation signatures
//! - `compute`: the `Compute` trait implemented by equation functions
//! - `functions`: built-in arithmetic relations
//! - `graph`: variables, equations, cycle detection, and the scheduler
//! - `runtime`: transactions, the `Engine`, and change streams
//! - `config`: engine settings
//!
//! # Example
//!
//! ```rust
//! use cascade_core::{functions, Engine, Value};
//!
//! let engine = Engine::new();
//! engine.declare_variable("a", 2).unwrap();
//! engine.declare_variable("b", 3).unwrap();
//! engine.declare_variable("c", 5).unwrap();
//! engine.declare_equation("c", &["a", "b"], functions::sum).unwrap();
//!
//! let mut changes = engine.subscribe();
//! let committed = engine.set("a", 5).unwrap();
//!
//! assert_eq!(committed.changed, vec!["a", "c"]);
//! assert_eq!(engine.get_value("c").unwrap(), Value::Int(8));
//!
//! let batch = changes.try_recv().unwrap();
//! for event in batch {
//!     println!("{}: {} -> {}", event.variable, event.old, event.new);
//! }
//! ```

pub mod compute;
pub mod config;
pub mod error;
pub mod functions;
pub mod graph;
pub mod runtime;
pub mod value;

pub use compute::{Compute, ComputeError};
pub use config::EngineConfig;
pub use error::{GraphError, Result};
pub use graph::{EquationRef, Graph, NodeId, VariableRef};
pub use runtime::{
    ChangeBatch, ChangeEvent, ChangeStream, Committed, Engine, SubscriberId, Transaction,
    TransactionState,
};
pub use value::{Signature, Value, ValueKind};
