//! Quiescence barrier for outstanding resource handles
//!
//! Resource owners report opens and closes from any thread or task; a
//! shutdown coordinator waits until nothing is open. Semantics:
//! - All mutation and the emptiness check share one lock
//! - At most one waiter; a second concurrent wait is rejected
//! - The close that empties the registry releases the waiter, exactly once
//! - Notifications keep flowing while a wait is outstanding
//! - Observers see notifications in the order they were applied

use crate::observer::ResourceObserver;
use crate::registry::HandleRegistry;
use quiesce_common::{
    BarrierConfig, BarrierError, BarrierResult, ContextId, OpenResource, ResourceEvent,
    ResourceEventKind, ResourceHandle, ResourceName,
};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

/// How the active waiter gets woken
#[derive(Debug)]
enum Release {
    /// Task suspended on the receiving half
    Task(oneshot::Sender<()>),
    /// Thread parked on the barrier's condvar
    Thread,
}

#[derive(Debug)]
enum WaitState {
    Idle,
    Waiting { id: u64, release: Release },
}

#[derive(Debug)]
struct State {
    registry: HandleRegistry,
    wait: WaitState,
    next_wait_id: u64,
}

impl State {
    /// `None` when already quiescent, otherwise the id of the new wait
    fn begin_wait(&mut self, release: Release) -> BarrierResult<Option<u64>> {
        if self.registry.is_empty() {
            return Ok(None);
        }
        if let WaitState::Waiting { .. } = self.wait {
            return Err(BarrierError::WaitAlreadyActive);
        }
        self.next_wait_id += 1;
        let id = self.next_wait_id;
        self.wait = WaitState::Waiting { id, release };
        Ok(Some(id))
    }

    fn is_waiting_on(&self, id: u64) -> bool {
        matches!(self.wait, WaitState::Waiting { id: current, .. } if current == id)
    }

    /// Drop wait `id` if it is still the active one
    fn withdraw(&mut self, id: u64) -> bool {
        if self.is_waiting_on(id) {
            self.wait = WaitState::Idle;
            true
        } else {
            false
        }
    }

    /// Outcome of wait `id` once its timeout elapsed. A release that won
    /// the race counts as success.
    fn expire(&mut self, id: u64) -> BarrierResult<()> {
        if !self.withdraw(id) {
            debug!(wait_id = id, "Release beat the timeout");
            return Ok(());
        }
        let open = self.registry.len();
        warn!(wait_id = id, open, "Timed out waiting for quiescence");
        Err(BarrierError::Timeout { open })
    }

    /// Waiting -> Idle. Only called with an empty registry.
    fn release_waiter(&mut self) -> bool {
        match std::mem::replace(&mut self.wait, WaitState::Idle) {
            WaitState::Idle => false,
            WaitState::Waiting { release, .. } => {
                if let Release::Task(tx) = release {
                    // Receiver gone means the wait future was dropped mid-flight
                    let _ = tx.send(());
                }
                true
            }
        }
    }
}

/// Withdraws an async wait whose future is dropped before release
struct PendingWait<'a> {
    barrier: &'a QuiescenceBarrier,
    id: u64,
}

impl Drop for PendingWait<'_> {
    fn drop(&mut self) {
        if self.barrier.lock_state().withdraw(self.id) {
            debug!(wait_id = self.id, "Quiescence wait withdrawn");
        }
    }
}

/// Tracks open resources per context and releases one waiter on quiescence.
///
/// Share it with `Arc` between the resource owner(s) and the coordinator.
pub struct QuiescenceBarrier {
    state: Mutex<State>,

    /// Held by a mutation from its state change through observer fan-out.
    /// Always taken before `state`.
    dispatch: Mutex<()>,

    /// Wakes a thread parked in the blocking wait
    released: Condvar,

    observers: RwLock<Vec<Arc<dyn ResourceObserver>>>,

    /// Applied by the untimed wait calls
    wait_timeout: Option<Duration>,
}

impl QuiescenceBarrier {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                registry: HandleRegistry::new(),
                wait: WaitState::Idle,
                next_wait_id: 0,
            }),
            dispatch: Mutex::new(()),
            released: Condvar::new(),
            observers: RwLock::new(Vec::new()),
            wait_timeout: None,
        }
    }

    pub fn from_config(config: &BarrierConfig) -> Self {
        Self::new().with_wait_timeout(config.wait_timeout())
    }

    pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout
    }

    // Mutations are applied whole, so a poisoned guard still holds a
    // consistent registry.
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_dispatch(&self) -> MutexGuard<'_, ()> {
        self.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_observer(&self, observer: Arc<dyn ResourceObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Returns whether the observer was registered
    pub fn remove_observer(&self, observer: &Arc<dyn ResourceObserver>) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|existing| !Arc::ptr_eq(existing, observer));
        observers.len() != before
    }

    fn notify_observers(&self, notify: impl Fn(&dyn ResourceObserver)) {
        // Snapshot so observers can (un)register without deadlocking
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in &observers {
            notify(observer.as_ref());
        }
    }

    /// Record that a resource was opened
    pub fn notify_opened(
        &self,
        context_id: impl Into<ContextId>,
        resource_name: impl Into<ResourceName>,
    ) -> BarrierResult<()> {
        let handle = ResourceHandle::new(context_id, resource_name);
        let _dispatch = self.lock_dispatch();
        let open = {
            let mut state = self.lock_state();
            if let Err(err) = state.registry.insert(&handle) {
                warn!(%handle, "Rejected open notification: {}", err);
                return Err(err);
            }
            state.registry.len()
        };

        debug!(%handle, open, "Resource opened");
        self.notify_observers(|observer| observer.on_opened(&handle));
        Ok(())
    }

    /// Record that a resource was fully closed. Releases the waiter if this
    /// was the last open resource.
    pub fn notify_closed(
        &self,
        context_id: impl Into<ContextId>,
        resource_name: impl Into<ResourceName>,
    ) -> BarrierResult<()> {
        let handle = ResourceHandle::new(context_id, resource_name);
        let _dispatch = self.lock_dispatch();
        let (open, released) = {
            let mut state = self.lock_state();
            if let Err(err) = state.registry.remove(&handle) {
                warn!(%handle, "Rejected close notification: {}", err);
                return Err(err);
            }
            let released = state.registry.is_empty() && state.release_waiter();
            (state.registry.len(), released)
        };

        debug!(%handle, open, "Resource closed");
        self.notify_observers(|observer| observer.on_closed(&handle));
        if open == 0 {
            self.finish_quiescence(released);
        }
        Ok(())
    }

    /// Record a write to an open resource
    pub fn notify_modified(
        &self,
        context_id: impl Into<ContextId>,
        resource_name: impl Into<ResourceName>,
    ) -> BarrierResult<()> {
        let handle = ResourceHandle::new(context_id, resource_name);
        let _dispatch = self.lock_dispatch();
        if let Err(err) = self.lock_state().registry.touch(&handle) {
            warn!(%handle, "Rejected modify notification: {}", err);
            return Err(err);
        }

        debug!(%handle, "Resource modified");
        self.notify_observers(|observer| observer.on_modified(&handle));
        Ok(())
    }

    /// Close everything a context still holds, for owners that went away
    /// without closing. Returns the names that were closed.
    pub fn close_context(&self, context_id: impl Into<ContextId>) -> Vec<ResourceName> {
        let context_id = context_id.into();
        let _dispatch = self.lock_dispatch();
        let (closed, quiescent, released) = {
            let mut state = self.lock_state();
            let closed = state.registry.drain_context(&context_id);
            let quiescent = !closed.is_empty() && state.registry.is_empty();
            let released = quiescent && state.release_waiter();
            (closed, quiescent, released)
        };

        if closed.is_empty() {
            return closed;
        }
        info!(context = %context_id, count = closed.len(), "Force-closed context resources");
        for name in &closed {
            let handle = ResourceHandle::new(context_id.clone(), name.clone());
            self.notify_observers(|observer| observer.on_closed(&handle));
        }
        if quiescent {
            self.finish_quiescence(released);
        }
        closed
    }

    /// Close every open resource. Returns the handles that were closed.
    pub fn close_all(&self) -> Vec<ResourceHandle> {
        let _dispatch = self.lock_dispatch();
        let (closed, released) = {
            let mut state = self.lock_state();
            let closed = state.registry.drain_all();
            let released = !closed.is_empty() && state.release_waiter();
            (closed, released)
        };

        if closed.is_empty() {
            return closed;
        }
        info!(count = closed.len(), "Force-closed all resources");
        for handle in &closed {
            self.notify_observers(|observer| observer.on_closed(handle));
        }
        self.finish_quiescence(released);
        closed
    }

    /// Dispatch a notification message
    pub fn apply(&self, event: &ResourceEvent) -> BarrierResult<()> {
        let ResourceHandle {
            context_id,
            resource_name,
        } = event.handle.clone();
        match event.kind {
            ResourceEventKind::Opened => self.notify_opened(context_id, resource_name),
            ResourceEventKind::Closed => self.notify_closed(context_id, resource_name),
            ResourceEventKind::Modified => self.notify_modified(context_id, resource_name),
        }
    }

    fn finish_quiescence(&self, released: bool) {
        if released {
            self.released.notify_all();
            info!("Quiescence reached, waiter released");
        } else {
            debug!("Quiescence reached");
        }
        self.notify_observers(|observer| observer.on_quiescent());
    }

    pub fn is_empty(&self) -> bool {
        self.lock_state().registry.is_empty()
    }

    pub fn open_count(&self) -> usize {
        self.lock_state().registry.len()
    }

    pub fn context_count(&self) -> usize {
        self.lock_state().registry.context_count()
    }

    pub fn is_open(
        &self,
        context_id: impl Into<ContextId>,
        resource_name: impl Into<ResourceName>,
    ) -> bool {
        let handle = ResourceHandle::new(context_id, resource_name);
        self.lock_state().registry.contains(&handle)
    }

    pub fn is_context_used(&self, context_id: impl Into<ContextId>) -> bool {
        let context_id = context_id.into();
        self.lock_state().registry.is_context_used(&context_id)
    }

    pub fn snapshot(&self) -> Vec<OpenResource> {
        self.lock_state().registry.snapshot()
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.lock_state().wait, WaitState::Waiting { .. })
    }

    /// Suspend the calling task until nothing is open. Returns at once if
    /// already quiescent. Honours the configured wait timeout.
    ///
    /// Dropping the returned future withdraws the wait.
    #[instrument(name = "quiescence_wait", skip(self))]
    pub async fn wait_until_quiescent(&self) -> BarrierResult<()> {
        self.await_quiescence(self.wait_timeout).await
    }

    #[instrument(name = "quiescence_wait_timeout", skip(self))]
    pub async fn wait_until_quiescent_timeout(&self, timeout: Duration) -> BarrierResult<()> {
        self.await_quiescence(Some(timeout)).await
    }

    async fn await_quiescence(&self, timeout: Option<Duration>) -> BarrierResult<()> {
        let (tx, rx) = oneshot::channel();
        let begun = {
            let mut state = self.lock_state();
            state.begin_wait(Release::Task(tx))
        };
        let Some(id) = begun? else {
            debug!("Already quiescent");
            return Ok(());
        };
        let _pending = PendingWait { barrier: self, id };

        debug!(wait_id = id, "Waiting for quiescence");
        let signal = match timeout {
            None => rx.await,
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(signal) => signal,
                Err(_) => return self.lock_state().expire(id),
            },
        };
        signal.map_err(|_| BarrierError::SignalDropped)
    }

    /// Park the calling thread until nothing is open. Honours the configured
    /// wait timeout. Do not call from an async runtime worker thread.
    #[instrument(name = "quiescence_wait_blocking", skip(self))]
    pub fn wait_until_quiescent_blocking(&self) -> BarrierResult<()> {
        self.block_until_quiescent(self.wait_timeout)
    }

    #[instrument(name = "quiescence_wait_blocking_timeout", skip(self))]
    pub fn wait_until_quiescent_blocking_timeout(&self, timeout: Duration) -> BarrierResult<()> {
        self.block_until_quiescent(Some(timeout))
    }

    fn block_until_quiescent(&self, timeout: Option<Duration>) -> BarrierResult<()> {
        let mut state = self.lock_state();
        let Some(id) = state.begin_wait(Release::Thread)? else {
            debug!("Already quiescent");
            return Ok(());
        };

        debug!(wait_id = id, "Blocking until quiescence");
        match timeout {
            None => {
                let _state = self
                    .released
                    .wait_while(state, |state| state.is_waiting_on(id))
                    .unwrap_or_else(PoisonError::into_inner);
                Ok(())
            }
            Some(limit) => {
                let (mut state, _) = self
                    .released
                    .wait_timeout_while(state, limit, |state| state.is_waiting_on(id))
                    .unwrap_or_else(PoisonError::into_inner);
                state.expire(id)
            }
        }
    }
}

impl Default for QuiescenceBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QuiescenceBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("QuiescenceBarrier")
            .field("open", &state.registry.len())
            .field("waiting", &matches!(state.wait, WaitState::Waiting { .. }))
            .field("wait_timeout", &self.wait_timeout)
            .finish_non_exhaustive()
    }
}
