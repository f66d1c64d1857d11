//! The orchestrator binding inbound messages to saga instances

use crate::{
    Bus, Causation, Def, GlueError, GlueStats, Instance, MessageEnvelope, MessageHandlerFn,
    MessageName, Saga, SagaConfFn, SagaId, SagaInvocation, SagaStore, SagaTypeId, Semantics,
    StoreError, SubscriptionKind, TimeoutManager, Transaction,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

struct Registry {
    defs: Vec<Arc<Def>>,
    by_message: HashMap<MessageName, Vec<Arc<Def>>>,
    subscribed: HashSet<MessageName>,
}

/// Ties inbound messages from the bus to the saga instances that need them.
///
/// Holds the registry of saga definitions and the message-name index, and
/// implements the dispatch algorithm, lifecycle transitions and timeout
/// integration. All persistence and timeout mutations of one dispatch run on
/// the transaction carried by the incoming invocation; a propagated error is
/// the caller's signal to roll that transaction back.
///
/// The entire dispatch body runs under one orchestrator-wide lock, making
/// message processing effectively single-threaded per orchestrator: the
/// check-existence, invoke, reconcile sequence for an instance is never
/// interleaved with another dispatch.
pub struct Glue {
    service_name: Box<str>,
    bus: Arc<dyn Bus>,
    store: Arc<dyn SagaStore>,
    timeouts: Arc<dyn TimeoutManager>,
    stats: GlueStats,
    registry: Mutex<Registry>,
}

impl Glue {
    /// Create an orchestrator and install its timeout callback on the
    /// manager.
    pub fn new(
        bus: Arc<dyn Bus>,
        store: Arc<dyn SagaStore>,
        service_name: &str,
        timeouts: Arc<dyn TimeoutManager>,
    ) -> Arc<Self> {
        let glue = Arc::new(Self {
            service_name: service_name.into(),
            bus,
            store,
            timeouts,
            stats: GlueStats::new(),
            registry: Mutex::new(Registry {
                defs: Vec::new(),
                by_message: HashMap::new(),
                subscribed: HashSet::new(),
            }),
        });
        let weak = Arc::downgrade(&glue);
        glue.timeouts
            .set_timeout_function(Arc::new(move |tx, saga_id| match weak.upgrade() {
                Some(glue) => glue.timeout_saga(tx, saga_id),
                None => Ok(()),
            }));
        glue
    }

    /// The orchestrator's lifecycle counters
    pub fn stats(&self) -> &GlueStats {
        &self.stats
    }

    /// Register a saga type with the orchestrator and subscribe its handled
    /// messages with the bus.
    ///
    /// One registration per concrete saga type, process-wide; a second
    /// attempt is rejected and leaves the index untouched. Configuration
    /// closures are applied to every instance before invocation and to every
    /// fresh instance on creation.
    pub fn register_saga(
        self: &Arc<Self>,
        saga: Box<dyn Saga>,
        conf_fns: Vec<SagaConfFn>,
    ) -> Result<(), GlueError> {
        let saga_type = saga.saga_type();
        let mut registry = self.lock_registry()?;

        if registry.defs.iter().any(|def| *def.saga_type() == saga_type) {
            return Err(GlueError::AlreadyRegistered(saga_type));
        }

        self.store.register_saga_type(&saga_type)?;

        let started_by = saga
            .started_by()
            .into_iter()
            .map(|descriptor| descriptor.name().clone())
            .collect();
        let mut def = Def::new(saga_type, saga.boxed_clone(), started_by, conf_fns);
        saga.register_handlers(&mut def);
        let def = Arc::new(def);

        for name in def.handled_messages() {
            registry
                .by_message
                .entry(name.clone())
                .or_default()
                .push(def.clone());
        }

        // one bus subscription per message name, shared across defs
        let weak = Arc::downgrade(self);
        let dispatch: MessageHandlerFn =
            Arc::new(move |invocation, envelope| match weak.upgrade() {
                Some(glue) => glue.saga_handler(invocation, envelope),
                None => Ok(()),
            });
        for subscription in def.subscriptions() {
            if !registry
                .subscribed
                .insert(subscription.descriptor.name().clone())
            {
                continue;
            }
            match &subscription.kind {
                SubscriptionKind::Message => self
                    .bus
                    .handle_message(&subscription.descriptor, dispatch.clone())?,
                SubscriptionKind::Event { exchange, topic } => self.bus.handle_event(
                    exchange,
                    topic,
                    &subscription.descriptor,
                    dispatch.clone(),
                )?,
            }
        }

        tracing::info!(
            saga_type = %def.saga_type(),
            handles_messages = def.handled_messages().count(),
            "registered saga with messages"
        );
        self.stats.sagas_registered.fetch_add(1, Ordering::Relaxed);
        registry.defs.push(def);
        Ok(())
    }

    /// The generic dispatch entry point the transport calls for every
    /// subscribed message.
    ///
    /// Per matching definition: a start message creates a new instance and
    /// ends the call; a correlated message is routed to its instance, with a
    /// missing instance treated as a benign cross-node completion; a command
    /// without correlation is unroutable; an event without correlation fans
    /// out over every stored instance of the type, stopping at the first
    /// failure and leaving earlier reconciliations as persisted.
    pub fn saga_handler(
        &self,
        invocation: &mut crate::Invocation<'_>,
        envelope: &MessageEnvelope,
    ) -> Result<(), GlueError> {
        let registry = self.lock_registry()?;
        self.stats.messages_dispatched.fetch_add(1, Ordering::Relaxed);

        let Some(defs) = registry.by_message.get(envelope.name()) else {
            tracing::warn!(message = %envelope.name(), "message delivered with no saga definitions");
            return Ok(());
        };

        for def in defs {
            if def.should_start_new(envelope) {
                return self.handle_new_saga(def, invocation, envelope);
            } else if let Some(correlation_id) = envelope.saga_correlation_id {
                let mut instance = match self.store.get_by_id(invocation.tx_mut(), correlation_id)
                {
                    Ok(instance) => instance,
                    Err(StoreError::NotFound(_)) => {
                        // The instance may have completed on another node or
                        // worker; erroring would reject the message and
                        // retry it forever for a saga that will never
                        // reappear.
                        tracing::warn!(
                            saga_correlation_id = %correlation_id,
                            message = %envelope.name(),
                            "correlated message but no saga instance with that id"
                        );
                        return Ok(());
                    }
                    Err(err) => {
                        tracing::error!(
                            saga_correlation_id = %correlation_id,
                            error = %err,
                            "failed to fetch saga by id"
                        );
                        return Err(err.into());
                    }
                };
                def.configure(instance.saga_mut());
                self.invoke_saga_instance(def, &mut instance, invocation, envelope)?;
                return self.complete_or_update_saga(invocation.tx_mut(), &instance);
            } else if envelope.semantics() == Semantics::Command {
                tracing::warn!(
                    message = %envelope.name(),
                    "command message received with no saga correlation id"
                );
                self.stats.unroutable_commands.fetch_add(1, Ordering::Relaxed);
                return Err(GlueError::UnroutableCommand(envelope.name().clone()));
            } else {
                let instances = self
                    .store
                    .get_by_type(invocation.tx_mut(), def.saga_type())?;
                tracing::info!(
                    saga_type = %def.saga_type(),
                    instances_fetched = instances.len(),
                    "fanning event out to saga instances"
                );
                for mut instance in instances {
                    def.configure(instance.saga_mut());
                    self.invoke_saga_instance(def, &mut instance, invocation, envelope)?;
                    self.complete_or_update_saga(invocation.tx_mut(), &instance)?;
                }
            }
        }

        Ok(())
    }

    /// Create, invoke and persist a new instance for a start message.
    fn handle_new_saga(
        &self,
        def: &Def,
        invocation: &mut crate::Invocation<'_>,
        envelope: &MessageEnvelope,
    ) -> Result<(), GlueError> {
        let causation = Causation {
            started_by: invocation.invoking_service().into(),
            started_by_saga: envelope.saga_id.clone(),
            started_by_rpc_id: envelope.rpc_id.clone(),
            started_by_message_id: envelope.id.clone(),
        };
        let mut instance = def.new_instance(causation);
        tracing::info!(
            saga_type = %def.saga_type(),
            saga_id = %instance.id(),
            "created new saga"
        );

        self.invoke_saga_instance(def, &mut instance, invocation, envelope)?;
        self.stats.sagas_started.fetch_add(1, Ordering::Relaxed);

        if !instance.is_complete() {
            tracing::info!(saga_id = %instance.id(), "saving new saga");
            self.store
                .save_new(invocation.tx_mut(), def.saga_type(), &instance)?;

            if let Some(duration) = instance.requested_timeout() {
                tracing::info!(
                    saga_id = %instance.id(),
                    timeout = ?duration,
                    "new saga requested a timeout"
                );
                self.timeouts
                    .register_timeout(invocation.tx_mut(), instance.id(), duration)?;
            }
        }
        // completed on its first invocation: never persisted, nothing to
        // delete
        Ok(())
    }

    /// Run the business handlers registered for the message, inside a span
    /// scoped to the definition.
    fn invoke_saga_instance(
        &self,
        def: &Def,
        instance: &mut Instance,
        invocation: &crate::Invocation<'_>,
        envelope: &MessageEnvelope,
    ) -> Result<(), GlueError> {
        let span = tracing::info_span!(
            "saga_invocation",
            saga_type = %def.saga_type(),
            saga_id = %instance.id()
        );
        let _entered = span.enter();

        let routing = invocation.routing();
        let context = SagaInvocation {
            saga_id: instance.id(),
            saga_type: def.saga_type().clone(),
            hosting_service: self.service_name.clone(),
            invoking_service: invocation.invoking_service().into(),
            causation: instance.causation().clone(),
            exchange: routing.exchange.clone(),
            routing_key: routing.routing_key.clone(),
            trace: invocation.trace().clone(),
        };

        for handler in def.handlers_for(envelope.name()) {
            if let Err(err) = handler(instance.saga_mut(), &context, envelope) {
                tracing::error!(error = %err, "failed to invoke saga");
                return Err(err);
            }
        }
        Ok(())
    }

    /// The single choke point for post-invocation state transitions: delete
    /// a completed instance and clear its timeout, or persist an update.
    fn complete_or_update_saga(
        &self,
        tx: &mut dyn Transaction,
        instance: &Instance,
    ) -> Result<(), GlueError> {
        if instance.is_complete() {
            tracing::info!(saga_id = %instance.id(), "saga has completed and will be deleted");
            self.store.delete(tx, instance)?;
            self.timeouts.clear_timeout(tx, instance.id())?;
            self.stats.sagas_completed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        self.store.update(tx, instance)?;
        self.stats.sagas_updated.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Fire callback installed on the timeout manager.
    ///
    /// An id absent from the store means the saga completed through normal
    /// dispatch before its timeout fired; the race is expected and the call
    /// is an idempotent no-op.
    pub fn timeout_saga(&self, tx: &mut dyn Transaction, saga_id: SagaId) -> Result<(), GlueError> {
        let mut instance = match self.store.get_by_id(tx, saga_id) {
            Ok(instance) => instance,
            Err(StoreError::NotFound(_)) => {
                tracing::info!(
                    saga_id = %saga_id,
                    "timeout fired for a missing saga, assuming it completed elsewhere"
                );
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let span = tracing::info_span!("saga_timeout", saga_id = %saga_id);
        let _entered = span.enter();

        if let Err(err) = instance.saga_mut().on_timeout() {
            tracing::error!(saga_id = %saga_id, error = %err, "failed to time out saga");
            return Err(err);
        }

        self.stats.timeouts_fired.fetch_add(1, Ordering::Relaxed);
        self.complete_or_update_saga(tx, &instance)
    }

    /// Start the timeout scheduling mechanism
    pub fn start(&self) -> Result<(), GlueError> {
        Ok(self.timeouts.start()?)
    }

    /// Stop the timeout scheduling mechanism
    pub fn stop(&self) -> Result<(), GlueError> {
        Ok(self.timeouts.stop()?)
    }

    fn lock_registry(&self) -> Result<std::sync::MutexGuard<'_, Registry>, GlueError> {
        self.registry
            .lock()
            .map_err(|_| GlueError::Internal("saga registry lock poisoned".into()))
    }
}
