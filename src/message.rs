//! Message descriptors and the inbound message envelope

use crate::{MessageName, SagaId};
use serde::{Deserialize, Serialize};

/// Delivery semantics of a message.
///
/// Commands have exactly one intended saga target and must carry a
/// correlation id; events may be broadcast to many or zero instances.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Semantics {
    /// One intended recipient, correlation id required
    Command,
    /// Broadcast, zero or more recipients
    Event,
}

/// Describes a message type: its schema name and delivery semantics.
///
/// The schema name doubles as the routing key for bus subscription and the
/// dispatch index key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageDescriptor {
    name: MessageName,
    semantics: Semantics,
}

impl MessageDescriptor {
    /// Create a descriptor for a schema name
    pub fn new(name: &str, semantics: Semantics) -> Self {
        Self {
            name: MessageName::new(name),
            semantics,
        }
    }

    /// The normalized schema name
    pub fn name(&self) -> &MessageName {
        &self.name
    }

    /// The delivery semantics
    pub fn semantics(&self) -> Semantics {
        self.semantics
    }
}

/// One inbound message as handed over by the transport.
///
/// The envelope is consumed, not owned: wire encoding and redelivery are the
/// bus's concern, the orchestrator only reads the routing fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageEnvelope {
    name: MessageName,
    semantics: Semantics,
    /// Wire id of this message
    pub id: Box<str>,
    /// RPC correlation id, if the message is part of a request/reply pair
    pub rpc_id: Box<str>,
    /// Id of the saga that sent this message, if any
    pub saga_id: Box<str>,
    /// Target saga instance, when the message is correlated to one
    pub saga_correlation_id: Option<SagaId>,
}

impl MessageEnvelope {
    /// Create an uncorrelated envelope for a message type
    pub fn new(descriptor: &MessageDescriptor, message_id: &str) -> Self {
        Self {
            name: descriptor.name().clone(),
            semantics: descriptor.semantics(),
            id: message_id.into(),
            rpc_id: "".into(),
            saga_id: "".into(),
            saga_correlation_id: None,
        }
    }

    /// Target a specific saga instance
    pub fn correlated(mut self, saga_id: SagaId) -> Self {
        self.saga_correlation_id = Some(saga_id);
        self
    }

    /// Record the saga that sent this message
    pub fn from_saga(mut self, saga_id: &str) -> Self {
        self.saga_id = saga_id.into();
        self
    }

    /// Record the rpc id this message replies to
    pub fn with_rpc_id(mut self, rpc_id: &str) -> Self {
        self.rpc_id = rpc_id.into();
        self
    }

    /// The normalized schema name
    pub fn name(&self) -> &MessageName {
        &self.name
    }

    /// The delivery semantics
    pub fn semantics(&self) -> Semantics {
        self.semantics
    }
}
