//! Transport registration boundary

use crate::{
    GlueError, Invocation, MessageDescriptor, MessageEnvelope, MessageName, Routing, Transaction,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Dispatch callback the orchestrator registers for every subscribed message
/// name.
pub type MessageHandlerFn = Arc<
    dyn for<'tx> Fn(&mut Invocation<'tx>, &MessageEnvelope) -> Result<(), GlueError> + Send + Sync,
>;

/// Bus errors
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Underlying transport failure
    #[error("transport error: {0}")]
    Transport(Box<str>),
    /// A handler is already registered for this message name
    #[error("message {0} already has a handler")]
    AlreadySubscribed(MessageName),
}

/// Message transport registration surface.
///
/// Publish/subscribe mechanics, acknowledgement and redelivery live behind
/// this trait; the orchestrator only registers its dispatch entry point,
/// once per message name.
pub trait Bus: Send + Sync + 'static {
    /// Register a handler for a point-to-point message
    fn handle_message(
        &self,
        descriptor: &MessageDescriptor,
        handler: MessageHandlerFn,
    ) -> Result<(), BusError>;

    /// Register a handler for an event topic on an exchange
    fn handle_event(
        &self,
        exchange: &str,
        topic: &str,
        descriptor: &MessageDescriptor,
        handler: MessageHandlerFn,
    ) -> Result<(), BusError>;
}

#[derive(Clone)]
struct BusSubscription {
    handler: MessageHandlerFn,
    exchange: Box<str>,
    routing_key: Box<str>,
}

/// In-memory bus for tests and single-process wiring.
///
/// Holds the subscription table and synchronously drives the registered
/// handler when a test delivers an envelope.
pub struct InMemoryBus {
    subscriptions: RwLock<HashMap<MessageName, BusSubscription>>,
}

impl InMemoryBus {
    /// Create a bus with no subscriptions
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Names with a registered handler
    pub fn subscribed_messages(&self) -> Vec<MessageName> {
        self.subscriptions
            .read()
            .map(|subs| subs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Deliver an envelope to its registered handler, building the
    /// invocation the transport would normally supply.
    pub fn deliver(
        &self,
        tx: &mut dyn Transaction,
        invoking_service: &str,
        envelope: &MessageEnvelope,
    ) -> Result<(), GlueError> {
        let subscription = {
            let subscriptions = self
                .subscriptions
                .read()
                .map_err(|e| GlueError::Internal(e.to_string().into()))?;
            subscriptions.get(envelope.name()).cloned()
        };
        let Some(subscription) = subscription else {
            return Err(GlueError::Bus(BusError::Transport(
                format!("no handler registered for {}", envelope.name()).into(),
            )));
        };
        let routing = Routing::new(&subscription.exchange, &subscription.routing_key);
        let mut invocation = Invocation::new(tx, invoking_service, routing);
        subscription.handler.as_ref()(&mut invocation, envelope)
    }

    fn subscribe(
        &self,
        descriptor: &MessageDescriptor,
        exchange: &str,
        routing_key: &str,
        handler: MessageHandlerFn,
    ) -> Result<(), BusError> {
        let mut subscriptions = self
            .subscriptions
            .write()
            .map_err(|e| BusError::Transport(e.to_string().into()))?;
        if subscriptions.contains_key(descriptor.name()) {
            return Err(BusError::AlreadySubscribed(descriptor.name().clone()));
        }
        subscriptions.insert(
            descriptor.name().clone(),
            BusSubscription {
                handler,
                exchange: exchange.into(),
                routing_key: routing_key.into(),
            },
        );
        Ok(())
    }
}

impl Bus for InMemoryBus {
    fn handle_message(
        &self,
        descriptor: &MessageDescriptor,
        handler: MessageHandlerFn,
    ) -> Result<(), BusError> {
        self.subscribe(descriptor, "", descriptor.name().as_str(), handler)
    }

    fn handle_event(
        &self,
        exchange: &str,
        topic: &str,
        descriptor: &MessageDescriptor,
        handler: MessageHandlerFn,
    ) -> Result<(), BusError> {
        self.subscribe(descriptor, exchange, topic, handler)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NoopTransaction, Semantics};

    fn noop_handler() -> MessageHandlerFn {
        Arc::new(|_invocation, _envelope| Ok(()))
    }

    #[test]
    fn duplicate_subscription_is_rejected() {
        let bus = InMemoryBus::new();
        let descriptor = MessageDescriptor::new("OrderCreated", Semantics::Event);
        bus.handle_event("orders", "order.created", &descriptor, noop_handler())
            .unwrap();
        let err = bus
            .handle_event("orders", "order.created", &descriptor, noop_handler())
            .unwrap_err();
        assert!(matches!(err, BusError::AlreadySubscribed(_)));
    }

    #[test]
    fn delivery_without_a_handler_fails() {
        let bus = InMemoryBus::new();
        let mut tx = NoopTransaction;
        let envelope = MessageEnvelope::new(
            &MessageDescriptor::new("Unknown", Semantics::Event),
            "m-1",
        );
        let err = bus.deliver(&mut tx, "svc", &envelope).unwrap_err();
        assert!(matches!(err, GlueError::Bus(BusError::Transport(_))));
    }

    #[test]
    fn delivery_attaches_subscription_routing() {
        let bus = InMemoryBus::new();
        let descriptor = MessageDescriptor::new("OrderCreated", Semantics::Event);
        let handler: MessageHandlerFn = Arc::new(|invocation, _envelope| {
            assert_eq!(invocation.routing().exchange.as_ref(), "orders");
            assert_eq!(invocation.routing().routing_key.as_ref(), "order.created");
            assert_eq!(invocation.invoking_service(), "remote-svc");
            Ok(())
        });
        bus.handle_event("orders", "order.created", &descriptor, handler)
            .unwrap();

        let mut tx = NoopTransaction;
        let envelope = MessageEnvelope::new(&descriptor, "m-1");
        bus.deliver(&mut tx, "remote-svc", &envelope).unwrap();
    }
}
