//! Quiescence barrier: tracks open resource handles per owning context and
//! lets one waiter suspend until every tracked resource has closed.
//!
//! - [`HandleRegistry`]: context -> open resource names, no empty contexts
//! - [`QuiescenceBarrier`]: serialized notifications plus a single waiter,
//!   released exactly once on the transition to empty
//! - [`ResourceObserver`]: optional fan-out of successful notifications
//! - [`EventPump`]: applies [`ResourceEvent`]s from a channel in order

pub mod barrier;
pub mod observer;
pub mod pump;
pub mod registry;

// Re-exports
pub use barrier::QuiescenceBarrier;
pub use observer::ResourceObserver;
pub use pump::{EventPump, PumpReport};
pub use registry::HandleRegistry;

pub use quiesce_common::{
    BarrierError, BarrierResult, ContextId, OpenResource, ResourceEvent, ResourceEventKind,
    ResourceHandle, ResourceName,
};
