//! Scripted replay of resource notifications.
//!
//! Every event goes through an [`EventPump`]. The waiter task starts before
//! the first event and stays parked on the barrier while events are still
//! being delivered, the way a shutdown path overlaps the last closes.

use anyhow::{Context, Result};
use quiesce_barrier::{BarrierError, BarrierResult, EventPump, QuiescenceBarrier, ResourceObserver};
use quiesce_common::{OpenResource, QuiesceConfig, ResourceEvent, ResourceEventKind, ResourceHandle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub events: Vec<ScriptEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptEvent {
    pub kind: ResourceEventKind,
    pub context: String,
    pub resource: String,
    /// Pause before sending this event
    #[serde(default)]
    pub delay_ms: u64,
}

impl ScriptEvent {
    pub fn to_event(&self) -> ResourceEvent {
        ResourceEvent {
            kind: self.kind,
            handle: ResourceHandle::new(self.context.as_str(), self.resource.as_str()),
        }
    }
}

impl ReplayScript {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse replay script")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayOptions {
    pub wait: bool,
    pub force_close: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub events: usize,
    pub applied: usize,
    pub rejected: usize,
    pub quiescent: bool,
    pub timed_out: bool,
    /// Delivery finished with resources open and no wait timeout to bound
    /// the wait, so the replay stopped waiting
    pub stalled: bool,
    pub force_closed: usize,
    pub remaining: Vec<OpenResource>,
}

/// Wakes the waiter task when something is opened
struct OpenSignal(Arc<Notify>);

impl ResourceObserver for OpenSignal {
    fn on_opened(&self, _handle: &ResourceHandle) {
        self.0.notify_one();
    }
}

/// Waits for quiescence, re-arming after each release until the script has
/// been fully delivered and the barrier is empty
fn spawn_waiter(
    barrier: Arc<QuiescenceBarrier>,
    opened: Arc<Notify>,
    mut delivered: watch::Receiver<bool>,
) -> JoinHandle<BarrierResult<()>> {
    tokio::spawn(async move {
        loop {
            barrier.wait_until_quiescent().await?;
            if *delivered.borrow() && barrier.is_empty() {
                return Ok(());
            }
            debug!("Quiescent mid-replay, waiting for the next open");
            tokio::select! {
                _ = opened.notified() => {}
                changed = delivered.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    })
}

async fn deliver(tx: mpsc::Sender<ResourceEvent>, script: &ReplayScript) -> Result<()> {
    for entry in &script.events {
        if entry.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(entry.delay_ms)).await;
        }
        tx.send(entry.to_event())
            .await
            .context("Event pump stopped early")?;
    }
    Ok(())
}

pub async fn run(
    script: &ReplayScript,
    config: &QuiesceConfig,
    options: ReplayOptions,
) -> Result<ReplaySummary> {
    let barrier = Arc::new(QuiescenceBarrier::from_config(&config.barrier));
    let opened = Arc::new(Notify::new());
    barrier.add_observer(Arc::new(OpenSignal(opened.clone())));

    let (delivered_tx, delivered_rx) = watch::channel(false);
    let waiter = options
        .wait
        .then(|| spawn_waiter(barrier.clone(), opened, delivered_rx));

    let (tx, pump) = EventPump::channel(barrier.clone(), config.barrier.pump_capacity);
    let pump = pump.spawn();

    let sent = deliver(tx, script).await;
    let report = pump.await.context("Event pump task failed");
    let report = match sent.and(report) {
        Ok(report) => report,
        Err(err) => {
            if let Some(waiter) = &waiter {
                waiter.abort();
            }
            return Err(err);
        }
    };
    delivered_tx.send_replace(true);
    info!(
        applied = report.applied,
        rejected = report.rejected,
        open = barrier.open_count(),
        "Replay delivered"
    );

    let mut timed_out = false;
    let mut stalled = false;
    if let Some(waiter) = waiter {
        if barrier.wait_timeout().is_none() && !barrier.is_empty() {
            // Nothing is left to close the rest
            warn!(
                open = barrier.open_count(),
                "Replay delivered with resources open and no wait timeout, not waiting"
            );
            waiter.abort();
            stalled = true;
        } else {
            match waiter.await.context("Quiescence waiter failed")? {
                Ok(()) => {}
                Err(BarrierError::Timeout { open }) => {
                    warn!(open, "Timed out waiting for quiescence during replay");
                    timed_out = true;
                }
                Err(err) => return Err(err).context("Quiescence wait failed"),
            }
        }
    }

    let remaining = barrier.snapshot();
    let quiescent = remaining.is_empty();
    let force_closed = if options.force_close {
        barrier.close_all().len()
    } else {
        0
    };

    Ok(ReplaySummary {
        events: script.events.len(),
        applied: report.applied,
        rejected: report.rejected,
        quiescent,
        timed_out,
        stalled,
        force_closed,
        remaining,
    })
}
