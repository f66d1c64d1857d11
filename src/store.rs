//! Saga persistence boundary

use crate::{Instance, SagaId, SagaTypeId};
use std::any::Any;
use std::collections::HashSet;
use std::sync::RwLock;

/// Opaque transaction handle supplied by the transport for one unit of work.
///
/// Store and timeout-manager implementations downcast it to their own
/// transaction type; commit and rollback stay with the caller.
pub trait Transaction: Send {
    /// Downcast access for concrete store implementations
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Transaction handle for collaborators that keep no transactional state.
pub struct NoopTransaction;

impl Transaction for NoopTransaction {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Saga store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No instance stored under the requested id
    #[error("saga instance {0} not found")]
    NotFound(SagaId),
    /// Underlying storage failure
    #[error("storage error: {0}")]
    Storage(Box<str>),
}

/// Persistence boundary for saga instances.
///
/// Every mutation takes the caller's transaction handle; `get_by_id` must
/// return [`StoreError::NotFound`] as a distinguishable condition because
/// dispatch treats it as a benign cross-node completion race.
pub trait SagaStore: Send + Sync + 'static {
    /// Prepare storage for a saga type, called once at registration
    fn register_saga_type(&self, saga_type: &SagaTypeId) -> Result<(), StoreError>;

    /// Persist a newly created instance
    fn save_new(
        &self,
        tx: &mut dyn Transaction,
        saga_type: &SagaTypeId,
        instance: &Instance,
    ) -> Result<(), StoreError>;

    /// Fetch one instance by id
    fn get_by_id(&self, tx: &mut dyn Transaction, id: SagaId) -> Result<Instance, StoreError>;

    /// Fetch all instances of a saga type, in the store's stable order
    fn get_by_type(
        &self,
        tx: &mut dyn Transaction,
        saga_type: &SagaTypeId,
    ) -> Result<Vec<Instance>, StoreError>;

    /// Persist the current state of an existing instance
    fn update(&self, tx: &mut dyn Transaction, instance: &Instance) -> Result<(), StoreError>;

    /// Delete a completed instance
    fn delete(&self, tx: &mut dyn Transaction, instance: &Instance) -> Result<(), StoreError>;
}

/// In-memory store for testing and single-process deployments.
///
/// Keeps instances in insertion order so `get_by_type` is stable, which the
/// broadcast fan-out relies on.
pub struct InMemoryStore {
    sagas: RwLock<Vec<(SagaTypeId, Instance)>>,
    types: RwLock<HashSet<SagaTypeId>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            sagas: RwLock::new(Vec::new()),
            types: RwLock::new(HashSet::new()),
        }
    }

    /// Number of stored instances
    pub fn saga_count(&self) -> usize {
        self.sagas.read().map(|s| s.len()).unwrap_or(0)
    }
}

impl SagaStore for InMemoryStore {
    fn register_saga_type(&self, saga_type: &SagaTypeId) -> Result<(), StoreError> {
        let mut types = self
            .types
            .write()
            .map_err(|e| StoreError::Storage(e.to_string().into()))?;
        types.insert(saga_type.clone());
        Ok(())
    }

    fn save_new(
        &self,
        _tx: &mut dyn Transaction,
        saga_type: &SagaTypeId,
        instance: &Instance,
    ) -> Result<(), StoreError> {
        let registered = self
            .types
            .read()
            .map_err(|e| StoreError::Storage(e.to_string().into()))?
            .contains(saga_type);
        if !registered {
            return Err(StoreError::Storage(
                format!("saga type {saga_type} is not registered with the store").into(),
            ));
        }
        let mut sagas = self
            .sagas
            .write()
            .map_err(|e| StoreError::Storage(e.to_string().into()))?;
        sagas.push((saga_type.clone(), instance.clone()));
        Ok(())
    }

    fn get_by_id(&self, _tx: &mut dyn Transaction, id: SagaId) -> Result<Instance, StoreError> {
        let sagas = self
            .sagas
            .read()
            .map_err(|e| StoreError::Storage(e.to_string().into()))?;
        sagas
            .iter()
            .find(|(_, instance)| instance.id() == id)
            .map(|(_, instance)| instance.clone())
            .ok_or(StoreError::NotFound(id))
    }

    fn get_by_type(
        &self,
        _tx: &mut dyn Transaction,
        saga_type: &SagaTypeId,
    ) -> Result<Vec<Instance>, StoreError> {
        let sagas = self
            .sagas
            .read()
            .map_err(|e| StoreError::Storage(e.to_string().into()))?;
        Ok(sagas
            .iter()
            .filter(|(stored_type, _)| stored_type == saga_type)
            .map(|(_, instance)| instance.clone())
            .collect())
    }

    fn update(&self, _tx: &mut dyn Transaction, instance: &Instance) -> Result<(), StoreError> {
        let mut sagas = self
            .sagas
            .write()
            .map_err(|e| StoreError::Storage(e.to_string().into()))?;
        let slot = sagas
            .iter_mut()
            .find(|(_, stored)| stored.id() == instance.id())
            .ok_or(StoreError::NotFound(instance.id()))?;
        slot.1 = instance.clone();
        Ok(())
    }

    fn delete(&self, _tx: &mut dyn Transaction, instance: &Instance) -> Result<(), StoreError> {
        let mut sagas = self
            .sagas
            .write()
            .map_err(|e| StoreError::Storage(e.to_string().into()))?;
        let before = sagas.len();
        sagas.retain(|(_, stored)| stored.id() != instance.id());
        if sagas.len() == before {
            return Err(StoreError::NotFound(instance.id()));
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Causation, Def, MessageDescriptor, Saga, SagaTypeId};
    use std::any::Any;

    #[derive(Clone, Default)]
    struct CounterSaga {
        count: u32,
        complete: bool,
    }

    impl Saga for CounterSaga {
        fn saga_type(&self) -> SagaTypeId {
            SagaTypeId::new("counter-saga")
        }

        fn started_by(&self) -> Vec<MessageDescriptor> {
            Vec::new()
        }

        fn register_handlers(&self, _def: &mut Def) {}

        fn is_complete(&self) -> bool {
            self.complete
        }

        fn new_instance(&self) -> Box<dyn Saga> {
            Box::new(Self::default())
        }

        fn boxed_clone(&self) -> Box<dyn Saga> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn causation() -> Causation {
        Causation {
            started_by: "svc".into(),
            started_by_saga: "".into(),
            started_by_rpc_id: "".into(),
            started_by_message_id: "m-1".into(),
        }
    }

    fn instance(count: u32) -> Instance {
        Instance::new(
            Box::new(CounterSaga {
                count,
                complete: false,
            }),
            causation(),
        )
    }

    fn counter_type() -> SagaTypeId {
        SagaTypeId::new("counter-saga")
    }

    #[test]
    fn save_requires_registered_type() {
        let store = InMemoryStore::new();
        let mut tx = NoopTransaction;
        let err = store
            .save_new(&mut tx, &counter_type(), &instance(0))
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
    }

    #[test]
    fn round_trips_an_instance() {
        let store = InMemoryStore::new();
        let mut tx = NoopTransaction;
        store.register_saga_type(&counter_type()).unwrap();

        let stored = instance(3);
        store.save_new(&mut tx, &counter_type(), &stored).unwrap();

        let fetched = store.get_by_id(&mut tx, stored.id()).unwrap();
        assert_eq!(fetched.id(), stored.id());
        let saga = fetched.saga().as_any().downcast_ref::<CounterSaga>().unwrap();
        assert_eq!(saga.count, 3);
    }

    #[test]
    fn missing_id_is_distinguishable() {
        let store = InMemoryStore::new();
        let mut tx = NoopTransaction;
        let id = SagaId::new();
        assert!(matches!(
            store.get_by_id(&mut tx, id),
            Err(StoreError::NotFound(missing)) if missing == id
        ));
    }

    #[test]
    fn get_by_type_preserves_insertion_order() {
        let store = InMemoryStore::new();
        let mut tx = NoopTransaction;
        store.register_saga_type(&counter_type()).unwrap();

        let first = instance(1);
        let second = instance(2);
        let third = instance(3);
        for inst in [&first, &second, &third] {
            store.save_new(&mut tx, &counter_type(), inst).unwrap();
        }

        let fetched = store.get_by_type(&mut tx, &counter_type()).unwrap();
        let ids: Vec<_> = fetched.iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec![first.id(), second.id(), third.id()]);
    }

    #[test]
    fn update_replaces_state_in_place() {
        let store = InMemoryStore::new();
        let mut tx = NoopTransaction;
        store.register_saga_type(&counter_type()).unwrap();

        let mut stored = instance(0);
        store.save_new(&mut tx, &counter_type(), &stored).unwrap();

        stored
            .saga_mut()
            .as_any_mut()
            .downcast_mut::<CounterSaga>()
            .unwrap()
            .count = 7;
        store.update(&mut tx, &stored).unwrap();

        let fetched = store.get_by_id(&mut tx, stored.id()).unwrap();
        let saga = fetched.saga().as_any().downcast_ref::<CounterSaga>().unwrap();
        assert_eq!(saga.count, 7);
    }

    #[test]
    fn delete_removes_the_instance() {
        let store = InMemoryStore::new();
        let mut tx = NoopTransaction;
        store.register_saga_type(&counter_type()).unwrap();

        let stored = instance(0);
        store.save_new(&mut tx, &counter_type(), &stored).unwrap();
        store.delete(&mut tx, &stored).unwrap();

        assert!(matches!(
            store.get_by_id(&mut tx, stored.id()),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(&mut tx, &stored),
            Err(StoreError::NotFound(_))
        ));
    }
}
