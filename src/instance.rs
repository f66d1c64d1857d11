//! Persisted saga instances

use crate::{Saga, SagaId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Causation metadata captured when an instance is created, immutable
/// afterward.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Causation {
    /// Service whose message started the instance
    pub started_by: Box<str>,
    /// Saga that sent the starting message, if any
    pub started_by_saga: Box<str>,
    /// RPC id of the starting message
    pub started_by_rpc_id: Box<str>,
    /// Wire id of the starting message
    pub started_by_message_id: Box<str>,
}

/// One persisted execution of a saga.
///
/// Created only on the new-saga path, mutated only inside an invocation
/// bounded by the caller's transaction, and deleted the moment its saga
/// reports completion. Business state lives in the boxed saga and is opaque
/// to the orchestrator.
pub struct Instance {
    id: SagaId,
    causation: Causation,
    saga: Box<dyn Saga>,
}

impl Instance {
    /// Create a fresh instance around newly constructed business state
    pub fn new(saga: Box<dyn Saga>, causation: Causation) -> Self {
        Self {
            id: SagaId::new(),
            causation,
            saga,
        }
    }

    /// The instance id
    pub fn id(&self) -> SagaId {
        self.id
    }

    /// Causation metadata of this instance
    pub fn causation(&self) -> &Causation {
        &self.causation
    }

    /// Whether the business state reports completion
    pub fn is_complete(&self) -> bool {
        self.saga.is_complete()
    }

    /// Timeout requested by the business state, if any
    pub fn requested_timeout(&self) -> Option<Duration> {
        self.saga.requested_timeout()
    }

    /// Borrow the business state
    pub fn saga(&self) -> &dyn Saga {
        self.saga.as_ref()
    }

    /// Borrow the business state mutably
    pub fn saga_mut(&mut self) -> &mut dyn Saga {
        self.saga.as_mut()
    }
}

impl Clone for Instance {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            causation: self.causation.clone(),
            saga: self.saga.boxed_clone(),
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("saga_type", &self.saga.saga_type())
            .field("complete", &self.is_complete())
            .finish()
    }
}
