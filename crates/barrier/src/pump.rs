//! Single-consumer delivery of notifications into a barrier.
//!
//! Producers only hold a channel sender; one task applies events in arrival
//! order, so the barrier sees them serialized per channel.

use crate::barrier::QuiescenceBarrier;
use quiesce_common::ResourceEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Counts from a finished pump
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub applied: usize,
    pub rejected: usize,
}

pub struct EventPump {
    barrier: Arc<QuiescenceBarrier>,
    events: mpsc::Receiver<ResourceEvent>,
}

impl EventPump {
    pub fn new(barrier: Arc<QuiescenceBarrier>, events: mpsc::Receiver<ResourceEvent>) -> Self {
        Self { barrier, events }
    }

    /// Bounded channel plus the pump draining it. A capacity of 0 is
    /// raised to 1.
    pub fn channel(
        barrier: Arc<QuiescenceBarrier>,
        capacity: usize,
    ) -> (mpsc::Sender<ResourceEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(barrier, rx))
    }

    /// Apply events until every sender is dropped. Rejected events are
    /// logged and counted; they never stop the pump.
    pub async fn run(mut self) -> PumpReport {
        let mut report = PumpReport::default();

        while let Some(event) = self.events.recv().await {
            match self.barrier.apply(&event) {
                Ok(()) => report.applied += 1,
                Err(err) => {
                    warn!(%event, "Dropping bad notification: {}", err);
                    report.rejected += 1;
                }
            }
        }

        info!(
            applied = report.applied,
            rejected = report.rejected,
            "Event pump finished"
        );
        report
    }

    pub fn spawn(self) -> JoinHandle<PumpReport> {
        tokio::spawn(self.run())
    }
}
