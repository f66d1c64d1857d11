//! Orchestration error taxonomy

use crate::{BusError, MessageName, SagaTypeId, StoreError, TimeoutError};

/// Errors surfaced by the orchestrator.
///
/// Collaborator failures propagate verbatim through the wrapping variants;
/// the caller's transaction is expected to roll back on any of them. Benign
/// absences (a correlated instance already completed elsewhere, a timeout
/// firing for a gone instance) never surface here.
#[derive(Debug, thiserror::Error)]
pub enum GlueError {
    /// A saga type may be registered at most once per process
    #[error("saga type {0} already registered")]
    AlreadyRegistered(SagaTypeId),
    /// A command must always carry a saga correlation id
    #[error("cannot resolve a saga instance for command {0}")]
    UnroutableCommand(MessageName),
    /// Persistence failure, propagated from the store
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Scheduling failure, propagated from the timeout manager
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    /// Transport failure, propagated from the bus
    #[error(transparent)]
    Bus(#[from] BusError),
    /// Business logic failure, propagated from a saga handler
    #[error("saga handler failed: {0}")]
    Handler(Box<str>),
    /// Orchestrator invariant violation
    #[error("internal error: {0}")]
    Internal(Box<str>),
}

impl GlueError {
    /// Create a business-logic failure
    pub fn handler(reason: impl Into<Box<str>>) -> Self {
        Self::Handler(reason.into())
    }
}
