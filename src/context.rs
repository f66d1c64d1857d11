//! Saga identity types and tracing context

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one saga instance, generated when the instance is
/// created and used as the correlation target for follow-up messages.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SagaId(Uuid);

impl SagaId {
    /// Generate a fresh instance id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying uuid
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SagaId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SagaId({})", self.0)
    }
}

impl std::fmt::Display for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable, author-supplied identifier for a saga type.
///
/// Compared by value when a registration is checked against the registry,
/// so every concrete saga type must pick a distinct tag.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SagaTypeId(Box<str>);

impl SagaTypeId {
    /// Create a type id from its stable tag
    pub fn new(tag: &str) -> Self {
        Self(tag.into())
    }

    /// The tag as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SagaTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SagaTypeId({})", self.0)
    }
}

impl std::fmt::Display for SagaTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message schema name used as the dispatch and subscription key.
///
/// Routing is case-insensitive, so the name is lowercased on construction
/// and every lookup goes through the normalized form.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageName(Box<str>);

impl MessageName {
    /// Create a normalized message name
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase().into())
    }

    /// The normalized name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for MessageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageName({})", self.0)
    }
}

impl std::fmt::Display for MessageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation fields carried through dispatch and into saga handlers.
///
/// An explicit value rather than ambient state: the transport stamps it on
/// the invocation and the orchestrator threads it into every handler call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceContext {
    /// Id of this unit of work
    pub trace_id: u64,
    /// Id of the unit of work that caused this one (0 for roots)
    pub causation_id: u64,
}

impl TraceContext {
    /// Create a root trace context
    pub fn new() -> Self {
        Self {
            trace_id: Self::next_trace_id(),
            causation_id: 0,
        }
    }

    /// Create a context caused by this one
    pub fn child(&self) -> Self {
        Self {
            trace_id: Self::next_trace_id(),
            causation_id: self.trace_id,
        }
    }

    fn next_trace_id() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}
