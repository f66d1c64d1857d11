//! Per-message unit-of-work context

use crate::{Causation, SagaId, SagaTypeId, TraceContext, Transaction};

/// Bus routing metadata for the message being processed, re-attached to the
/// instance's own outbound messages so they are attributed correctly.
#[derive(Clone, Debug)]
pub struct Routing {
    /// Exchange the message arrived on
    pub exchange: Box<str>,
    /// Routing key the message arrived with
    pub routing_key: Box<str>,
}

impl Routing {
    /// Create a routing pair
    pub fn new(exchange: &str, routing_key: &str) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }
}

/// The unit of work the transport hands to the dispatch entry point for one
/// delivered message.
///
/// Carries the transaction every persistence and timeout mutation of this
/// dispatch must use. Commit and rollback stay with the transport: an error
/// propagated out of dispatch is the rollback signal.
pub struct Invocation<'tx> {
    tx: &'tx mut dyn Transaction,
    invoking_service: Box<str>,
    trace: TraceContext,
    routing: Routing,
}

impl<'tx> Invocation<'tx> {
    /// Create the unit of work for one delivery
    pub fn new(tx: &'tx mut dyn Transaction, invoking_service: &str, routing: Routing) -> Self {
        Self {
            tx,
            invoking_service: invoking_service.into(),
            trace: TraceContext::new(),
            routing,
        }
    }

    /// The transaction bounding this unit of work
    pub fn tx_mut(&mut self) -> &mut dyn Transaction {
        &mut *self.tx
    }

    /// The service that sent the message being processed
    pub fn invoking_service(&self) -> &str {
        &self.invoking_service
    }

    /// The tracing context of this unit of work
    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    /// The routing metadata of the inbound message
    pub fn routing(&self) -> &Routing {
        &self.routing
    }
}

/// Decorated, plain-data context handed to a saga's business handlers.
///
/// Exposes the hosting service, the full causation chain of the instance and
/// the inbound routing pair. Carries no live resources; sagas reach their own
/// collaborators through state they own.
#[derive(Clone, Debug)]
pub struct SagaInvocation {
    /// Instance the handler is being invoked on
    pub saga_id: SagaId,
    /// Type of the saga being invoked
    pub saga_type: SagaTypeId,
    /// Service hosting the orchestrator
    pub hosting_service: Box<str>,
    /// Service that sent the message being processed
    pub invoking_service: Box<str>,
    /// Causation metadata stamped when the instance was created
    pub causation: Causation,
    /// Exchange of the inbound message
    pub exchange: Box<str>,
    /// Routing key of the inbound message
    pub routing_key: Box<str>,
    /// Tracing context of this unit of work
    pub trace: TraceContext,
}

impl SagaInvocation {
    /// The inbound routing pair as `(exchange, routing_key)`
    pub fn routing(&self) -> (&str, &str) {
        (&self.exchange, &self.routing_key)
    }
}
