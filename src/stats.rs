//! Orchestrator statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle counters kept by the orchestrator
pub struct GlueStats {
    /// Saga types registered
    pub sagas_registered: AtomicU64,
    /// Instances created by a start message
    pub sagas_started: AtomicU64,
    /// Instances deleted after reporting completion
    pub sagas_completed: AtomicU64,
    /// Instances persisted by a post-invocation update
    pub sagas_updated: AtomicU64,
    /// Messages routed through the dispatch entry point
    pub messages_dispatched: AtomicU64,
    /// Timeouts fired against a live instance
    pub timeouts_fired: AtomicU64,
    /// Commands rejected for missing a correlation id
    pub unroutable_commands: AtomicU64,
}

impl GlueStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            sagas_registered: AtomicU64::new(0),
            sagas_started: AtomicU64::new(0),
            sagas_completed: AtomicU64::new(0),
            sagas_updated: AtomicU64::new(0),
            messages_dispatched: AtomicU64::new(0),
            timeouts_fired: AtomicU64::new(0),
            unroutable_commands: AtomicU64::new(0),
        }
    }

    /// Consistent point-in-time view of the counters
    pub fn snapshot(&self) -> GlueStatsSnapshot {
        GlueStatsSnapshot {
            sagas_registered: self.sagas_registered.load(Ordering::Relaxed),
            sagas_started: self.sagas_started.load(Ordering::Relaxed),
            sagas_completed: self.sagas_completed.load(Ordering::Relaxed),
            sagas_updated: self.sagas_updated.load(Ordering::Relaxed),
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
            timeouts_fired: self.timeouts_fired.load(Ordering::Relaxed),
            unroutable_commands: self.unroutable_commands.load(Ordering::Relaxed),
        }
    }
}

impl Default for GlueStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of [`GlueStats`]
#[derive(Clone, Debug)]
pub struct GlueStatsSnapshot {
    /// Saga types registered
    pub sagas_registered: u64,
    /// Instances created by a start message
    pub sagas_started: u64,
    /// Instances deleted after reporting completion
    pub sagas_completed: u64,
    /// Instances persisted by a post-invocation update
    pub sagas_updated: u64,
    /// Messages routed through the dispatch entry point
    pub messages_dispatched: u64,
    /// Timeouts fired against a live instance
    pub timeouts_fired: u64,
    /// Commands rejected for missing a correlation id
    pub unroutable_commands: u64,
}
