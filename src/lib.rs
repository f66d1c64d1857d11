//! Message-Driven Saga Orchestration
//!
//! Binds inbound messages arriving from a message bus to long-running,
//! stateful business processes (sagas): creation, correlation-based lookup,
//! invocation, persistence, completion and timeout scheduling. The transport,
//! the storage engine and the timeout scheduler are collaborators behind
//! traits; this crate owns the dispatch algorithm and its correctness
//! guarantees (one instance per correlation, state transitions coupled to the
//! caller's transaction, benign handling of cross-node completion races).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! // 1. Implement the author contract for your saga type
//! impl Saga for OrderSaga { /* ... */ }
//!
//! // 2. Wire the orchestrator to its collaborators
//! let glue = Glue::new(bus, store, "order-svc", timeout_manager);
//!
//! // 3. Register the saga; its handled messages are subscribed with the bus
//! glue.register_saga(Box::new(OrderSaga::default()), Vec::new())?;
//! glue.start()?;
//! ```

#![warn(missing_docs)]

// === Core Types ===
mod context;
mod instance;
mod invocation;
mod message;

// === Author Contract ===
mod def;
mod saga;

// === Collaborators ===
mod bus;
mod store;
mod timeout;

// === Orchestrator ===
mod errors;
mod glue;
mod stats;

// === Re-exports ===

// Identity and context
pub use context::{MessageName, SagaId, SagaTypeId, TraceContext};
pub use invocation::{Invocation, Routing, SagaInvocation};

// Messages
pub use message::{MessageDescriptor, MessageEnvelope, Semantics};

// Instances and definitions
pub use def::{Def, HandlerFn, Subscription, SubscriptionKind};
pub use instance::{Causation, Instance};
pub use saga::{Saga, SagaConfFn};

// Collaborators
pub use bus::{Bus, BusError, InMemoryBus, MessageHandlerFn};
pub use store::{InMemoryStore, NoopTransaction, SagaStore, StoreError, Transaction};
pub use timeout::{
    InMemoryTimeoutManager, LocalTimeoutManager, TimeoutError, TimeoutFn, TimeoutManager,
};

// Orchestrator
pub use errors::GlueError;
pub use glue::Glue;
pub use stats::{GlueStats, GlueStatsSnapshot};
