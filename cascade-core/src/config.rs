//! Engine Configuration
//!
//! Settings are plain data with serde support so a host application can load
//! them from its own configuration file, e.g.
//!
//! ```json
//! { "lock_timeout_ms": 250, "settle_on_declare": true }
//! ```
//!
//! Missing fields fall back to [`EngineConfig::default`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration of an [`Engine`](crate::Engine).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a transaction or structural change waits to enter the
    /// engine's exclusion boundary. `None` waits indefinitely; on timeout the
    /// call fails with `GraphError::ConcurrentTransaction`.
    pub lock_timeout_ms: Option<u64>,

    /// Evaluate each new equation, and everything downstream of it, as part
    /// of its declaration. Without this, declared outputs keep their initial
    /// value until an input changes or `recompute_all` runs.
    pub settle_on_declare: bool,
}

impl EngineConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_settle_on_declare(mut self, settle: bool) -> Self {
        self.settle_on_declare = settle;
        self
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }
}
