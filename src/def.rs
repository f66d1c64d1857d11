//! Per-saga-type registration record

use crate::{
    GlueError, Instance, MessageDescriptor, MessageEnvelope, MessageName, Saga, SagaConfFn,
    SagaInvocation, SagaTypeId,
};
use std::collections::{HashMap, HashSet};

/// Business handler bound to one message name, dispatching into the boxed
/// saga state.
pub type HandlerFn =
    Box<dyn Fn(&mut dyn Saga, &SagaInvocation, &MessageEnvelope) -> Result<(), GlueError> + Send + Sync>;

/// How a handled message is subscribed with the bus.
#[derive(Clone, Debug)]
pub enum SubscriptionKind {
    /// Point-to-point message subscription
    Message,
    /// Topic subscription on an exchange
    Event {
        /// Exchange to bind on
        exchange: Box<str>,
        /// Topic to bind to
        topic: Box<str>,
    },
}

/// One bus subscription a saga type requires.
#[derive(Clone, Debug)]
pub struct Subscription {
    /// The message type being subscribed
    pub descriptor: MessageDescriptor,
    /// How to subscribe it
    pub kind: SubscriptionKind,
}

/// Static registration record for one saga type: which messages start it,
/// which messages it handles and through which callbacks.
///
/// Built once during [`Glue::register_saga`](crate::Glue::register_saga) by
/// letting the saga wire its own handler table, then held read-only for the
/// process lifetime.
pub struct Def {
    saga_type: SagaTypeId,
    prototype: Box<dyn Saga>,
    conf_fns: Vec<SagaConfFn>,
    started_by: HashSet<MessageName>,
    handlers: HashMap<MessageName, Vec<HandlerFn>>,
    subscriptions: Vec<Subscription>,
}

impl Def {
    pub(crate) fn new(
        saga_type: SagaTypeId,
        prototype: Box<dyn Saga>,
        started_by: HashSet<MessageName>,
        conf_fns: Vec<SagaConfFn>,
    ) -> Self {
        Self {
            saga_type,
            prototype,
            conf_fns,
            started_by,
            handlers: HashMap::new(),
            subscriptions: Vec::new(),
        }
    }

    /// The saga type this record describes
    pub fn saga_type(&self) -> &SagaTypeId {
        &self.saga_type
    }

    /// Register a handler for a point-to-point message.
    ///
    /// The closure receives the concrete saga type; a mismatch between the
    /// registered type and the dispatched instance surfaces as a handler
    /// error.
    pub fn handle_message<S, F>(&mut self, descriptor: MessageDescriptor, handler: F)
    where
        S: Saga,
        F: Fn(&mut S, &SagaInvocation, &MessageEnvelope) -> Result<(), GlueError>
            + Send
            + Sync
            + 'static,
    {
        self.register::<S, F>(descriptor, SubscriptionKind::Message, handler);
    }

    /// Register a handler for an event topic.
    pub fn handle_event<S, F>(
        &mut self,
        exchange: &str,
        topic: &str,
        descriptor: MessageDescriptor,
        handler: F,
    ) where
        S: Saga,
        F: Fn(&mut S, &SagaInvocation, &MessageEnvelope) -> Result<(), GlueError>
            + Send
            + Sync
            + 'static,
    {
        self.register::<S, F>(
            descriptor,
            SubscriptionKind::Event {
                exchange: exchange.into(),
                topic: topic.into(),
            },
            handler,
        );
    }

    fn register<S, F>(&mut self, descriptor: MessageDescriptor, kind: SubscriptionKind, handler: F)
    where
        S: Saga,
        F: Fn(&mut S, &SagaInvocation, &MessageEnvelope) -> Result<(), GlueError>
            + Send
            + Sync
            + 'static,
    {
        let wrapped: HandlerFn = Box::new(move |saga, invocation, envelope| {
            match saga.as_any_mut().downcast_mut::<S>() {
                Some(concrete) => handler(concrete, invocation, envelope),
                None => Err(GlueError::handler(
                    "saga instance does not match the registered handler type",
                )),
            }
        });
        self.handlers
            .entry(descriptor.name().clone())
            .or_default()
            .push(wrapped);
        self.subscriptions.push(Subscription { descriptor, kind });
    }

    /// Every message name this Def has handlers for
    pub fn handled_messages(&self) -> impl Iterator<Item = &MessageName> {
        self.handlers.keys()
    }

    pub(crate) fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    /// Whether this message is a creation trigger for the saga type
    pub fn should_start_new(&self, envelope: &MessageEnvelope) -> bool {
        self.started_by.contains(envelope.name())
    }

    pub(crate) fn handlers_for(&self, name: &MessageName) -> &[HandlerFn] {
        self.handlers.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Construct a configured instance with fresh business state
    pub(crate) fn new_instance(&self, causation: crate::Causation) -> Instance {
        let mut saga = self.prototype.new_instance();
        for conf in &self.conf_fns {
            conf(saga.as_mut());
        }
        Instance::new(saga, causation)
    }

    /// Apply the registered configuration closures to a fetched instance
    pub(crate) fn configure(&self, saga: &mut dyn Saga) {
        for conf in &self.conf_fns {
            conf(saga);
        }
    }
}

impl std::fmt::Debug for Def {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Def")
            .field("saga_type", &self.saga_type)
            .field("started_by", &self.started_by)
            .field("handles_messages", &self.handlers.len())
            .finish()
    }
}
