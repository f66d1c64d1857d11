//! Timeout scheduling boundary

use crate::{GlueError, NoopTransaction, SagaId, Transaction};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fire callback installed by the orchestrator, invoked with a transaction
/// and the id of the instance whose timeout elapsed.
pub type TimeoutFn =
    Arc<dyn Fn(&mut dyn Transaction, SagaId) -> Result<(), GlueError> + Send + Sync>;

/// Timeout manager errors
#[derive(Debug, thiserror::Error)]
pub enum TimeoutError {
    /// Underlying scheduler failure
    #[error("scheduler error: {0}")]
    Scheduler(Box<str>),
    /// A timeout fired before [`TimeoutManager::set_timeout_function`] ran
    #[error("no timeout function installed")]
    NoTimeoutFunction,
}

/// External scheduler that fires a callback for a saga instance id after a
/// requested duration.
///
/// Registration and clearing take the caller's transaction so a timeout is
/// armed or disarmed atomically with the dispatch that requested it.
pub trait TimeoutManager: Send + Sync + 'static {
    /// Install the orchestrator's fire callback
    fn set_timeout_function(&self, timeout_fn: TimeoutFn);

    /// Schedule a timeout for an instance
    fn register_timeout(
        &self,
        tx: &mut dyn Transaction,
        saga_id: SagaId,
        duration: Duration,
    ) -> Result<(), TimeoutError>;

    /// Drop any scheduled timeout for an instance
    fn clear_timeout(&self, tx: &mut dyn Transaction, saga_id: SagaId) -> Result<(), TimeoutError>;

    /// Start the scheduling mechanism
    fn start(&self) -> Result<(), TimeoutError>;

    /// Stop the scheduling mechanism
    fn stop(&self) -> Result<(), TimeoutError>;
}

/// Recording timeout manager for tests.
///
/// Never fires on its own; tests call [`InMemoryTimeoutManager::fire`] to
/// simulate an elapsed timeout through the installed callback.
pub struct InMemoryTimeoutManager {
    timeout_fn: Mutex<Option<TimeoutFn>>,
    pending: Mutex<HashMap<SagaId, Duration>>,
    cleared: Mutex<Vec<SagaId>>,
    running: AtomicBool,
}

impl InMemoryTimeoutManager {
    /// Create a manager with nothing scheduled
    pub fn new() -> Self {
        Self {
            timeout_fn: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            cleared: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Duration registered for an instance, if one is pending
    pub fn pending_timeout(&self, saga_id: SagaId) -> Option<Duration> {
        self.pending.lock().ok()?.get(&saga_id).copied()
    }

    /// Ids whose timeouts were cleared, in clearing order
    pub fn cleared(&self) -> Vec<SagaId> {
        self.cleared.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Whether `start` has been called without a matching `stop`
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Simulate an elapsed timeout for an instance
    pub fn fire(&self, tx: &mut dyn Transaction, saga_id: SagaId) -> Result<(), GlueError> {
        let timeout_fn = self
            .timeout_fn
            .lock()
            .map_err(|e| TimeoutError::Scheduler(e.to_string().into()))?
            .clone()
            .ok_or(TimeoutError::NoTimeoutFunction)?;
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&saga_id);
        }
        timeout_fn.as_ref()(tx, saga_id)
    }
}

impl TimeoutManager for InMemoryTimeoutManager {
    fn set_timeout_function(&self, timeout_fn: TimeoutFn) {
        if let Ok(mut slot) = self.timeout_fn.lock() {
            *slot = Some(timeout_fn);
        }
    }

    fn register_timeout(
        &self,
        _tx: &mut dyn Transaction,
        saga_id: SagaId,
        duration: Duration,
    ) -> Result<(), TimeoutError> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| TimeoutError::Scheduler(e.to_string().into()))?;
        pending.insert(saga_id, duration);
        Ok(())
    }

    fn clear_timeout(
        &self,
        _tx: &mut dyn Transaction,
        saga_id: SagaId,
    ) -> Result<(), TimeoutError> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| TimeoutError::Scheduler(e.to_string().into()))?;
        pending.remove(&saga_id);
        let mut cleared = self
            .cleared
            .lock()
            .map_err(|e| TimeoutError::Scheduler(e.to_string().into()))?;
        cleared.push(saga_id);
        Ok(())
    }

    fn start(&self) -> Result<(), TimeoutError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), TimeoutError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Default for InMemoryTimeoutManager {
    fn default() -> Self {
        Self::new()
    }
}

struct SchedulerInner {
    timeout_fn: Mutex<Option<TimeoutFn>>,
    pending: Mutex<HashMap<SagaId, tokio::task::JoinHandle<()>>>,
    running: AtomicBool,
}

/// Tokio-backed timeout scheduler for single-process deployments.
///
/// Each registration spawns a sleep task that invokes the installed callback
/// with a [`NoopTransaction`]; must be used from within a tokio runtime.
pub struct LocalTimeoutManager {
    inner: Arc<SchedulerInner>,
}

impl LocalTimeoutManager {
    /// Create a stopped scheduler
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                timeout_fn: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
            }),
        }
    }
}

impl TimeoutManager for LocalTimeoutManager {
    fn set_timeout_function(&self, timeout_fn: TimeoutFn) {
        if let Ok(mut slot) = self.inner.timeout_fn.lock() {
            *slot = Some(timeout_fn);
        }
    }

    fn register_timeout(
        &self,
        _tx: &mut dyn Transaction,
        saga_id: SagaId,
        duration: Duration,
    ) -> Result<(), TimeoutError> {
        if !self.inner.running.load(Ordering::SeqCst) {
            return Err(TimeoutError::Scheduler("scheduler is not running".into()));
        }
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Ok(mut pending) = inner.pending.lock() {
                pending.remove(&saga_id);
            }
            if !inner.running.load(Ordering::SeqCst) {
                return;
            }
            let timeout_fn = inner.timeout_fn.lock().ok().and_then(|slot| slot.clone());
            match timeout_fn {
                Some(timeout_fn) => {
                    if let Err(err) = timeout_fn.as_ref()(&mut NoopTransaction, saga_id) {
                        tracing::error!(saga_id = %saga_id, error = %err, "saga timeout failed");
                    }
                }
                None => {
                    tracing::warn!(saga_id = %saga_id, "timeout fired with no timeout function installed");
                }
            }
        });
        let mut pending = self
            .inner
            .pending
            .lock()
            .map_err(|e| TimeoutError::Scheduler(e.to_string().into()))?;
        if let Some(previous) = pending.insert(saga_id, handle) {
            previous.abort();
        }
        Ok(())
    }

    fn clear_timeout(
        &self,
        _tx: &mut dyn Transaction,
        saga_id: SagaId,
    ) -> Result<(), TimeoutError> {
        let mut pending = self
            .inner
            .pending
            .lock()
            .map_err(|e| TimeoutError::Scheduler(e.to_string().into()))?;
        if let Some(handle) = pending.remove(&saga_id) {
            handle.abort();
        }
        Ok(())
    }

    fn start(&self) -> Result<(), TimeoutError> {
        self.inner.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), TimeoutError> {
        self.inner.running.store(false, Ordering::SeqCst);
        let mut pending = self
            .inner
            .pending
            .lock()
            .map_err(|e| TimeoutError::Scheduler(e.to_string().into()))?;
        for (_, handle) in pending.drain() {
            handle.abort();
        }
        Ok(())
    }
}

impl Default for LocalTimeoutManager {
    fn default() -> Self {
        Self::new()
    }
}
