use quiesce_common::ResourceHandle;

/// Receives successful notifications applied to a [`crate::QuiescenceBarrier`].
///
/// Called in registration order on the thread that delivered the
/// notification. Deliveries are serialized across threads, so every observer
/// sees notifications in the order the barrier applied them.
///
/// Implementations must not block for long. They may query the barrier or
/// (un)register observers, but must not report opens or closes from inside a
/// callback: that deadlocks on the dispatch lock.
pub trait ResourceObserver: Send + Sync {
    fn on_opened(&self, _handle: &ResourceHandle) {}

    fn on_closed(&self, _handle: &ResourceHandle) {}

    fn on_modified(&self, _handle: &ResourceHandle) {}

    /// The registry just went from non-empty to empty
    fn on_quiescent(&self) {}
}
