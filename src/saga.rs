//! The saga author contract

use crate::{Def, GlueError, MessageDescriptor, SagaTypeId};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Configuration closure applied to every instance of a saga type before it
/// is invoked, and to every fresh instance on creation.
pub type SagaConfFn = Arc<dyn Fn(&mut dyn Saga) + Send + Sync>;

/// Contract a saga type implements to take part in orchestration.
///
/// A saga is a long-running, stateful process spanning multiple messages.
/// The orchestrator owns its lifecycle; the implementation owns the business
/// state and mutates it exclusively inside its registered handlers.
///
/// # Example
///
/// ```rust,ignore
/// impl Saga for OrderSaga {
///     fn saga_type(&self) -> SagaTypeId { SagaTypeId::new("order-saga") }
///
///     fn started_by(&self) -> Vec<MessageDescriptor> {
///         vec![MessageDescriptor::new("OrderCreated", Semantics::Event)]
///     }
///
///     fn register_handlers(&self, def: &mut Def) {
///         def.handle_event::<Self, _>("orders", "order.created",
///             MessageDescriptor::new("OrderCreated", Semantics::Event),
///             Self::on_created);
///         def.handle_message::<Self, _>(
///             MessageDescriptor::new("OrderPaid", Semantics::Command),
///             Self::on_paid);
///     }
///
///     fn is_complete(&self) -> bool { self.complete }
///     fn new_instance(&self) -> Box<dyn Saga> { Box::new(Self::default()) }
///     fn boxed_clone(&self) -> Box<dyn Saga> { Box::new(self.clone()) }
///     fn as_any(&self) -> &dyn Any { self }
///     fn as_any_mut(&mut self) -> &mut dyn Any { self }
/// }
/// ```
pub trait Saga: Send + Sync + 'static {
    /// Stable identity of this saga type, registered at most once per
    /// process.
    fn saga_type(&self) -> SagaTypeId;

    /// The messages that start a new instance of this saga.
    ///
    /// Handlers for these messages must still be wired up in
    /// [`Saga::register_handlers`]; this list only marks them as creation
    /// triggers.
    fn started_by(&self) -> Vec<MessageDescriptor>;

    /// Wire this saga's message-to-handler table against its [`Def`].
    fn register_handlers(&self, def: &mut Def);

    /// Whether this instance has reached its terminal state.
    ///
    /// Once true, the instance is deleted and never invoked again.
    fn is_complete(&self) -> bool;

    /// Create an instance with fresh business state.
    fn new_instance(&self) -> Box<dyn Saga>;

    /// Clone this instance's current state.
    fn boxed_clone(&self) -> Box<dyn Saga>;

    /// Upcast for typed handler dispatch
    fn as_any(&self) -> &dyn Any;

    /// Upcast for typed handler dispatch
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Timeout requested during the first invocation, if any.
    ///
    /// Read once, right after the instance is created and persisted.
    fn requested_timeout(&self) -> Option<Duration> {
        None
    }

    /// Invoked when a registered timeout fires for this instance.
    fn on_timeout(&mut self) -> Result<(), GlueError> {
        Ok(())
    }
}
