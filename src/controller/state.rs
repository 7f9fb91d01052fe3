//! State shared between the dispatcher and the worker pool

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use super::claims::ClaimSet;
use crate::config::DrainConfig;
use crate::drain::DrainProvider;
use crate::inventory::NodeInventory;

/// Lifecycle of a drain run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    /// Dispatcher polling, workers consuming
    Running,
    /// Work queue closed; workers finishing what was already handed out
    DrainingQueue,
    /// Every worker has exited
    Stopped,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Running => write!(f, "Running"),
            RunPhase::DrainingQueue => write!(f, "DrainingQueue"),
            RunPhase::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Counters updated by the dispatcher and workers
#[derive(Debug, Default)]
pub struct RunStats {
    polls: AtomicUsize,
    failed_polls: AtomicUsize,
    dispatched: AtomicUsize,
    drained: AtomicUsize,
    failed: AtomicUsize,
}

impl RunStats {
    pub(crate) fn record_poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_poll(&self) {
        self.failed_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drained(&self) {
        self.drained.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            polls: self.polls.load(Ordering::Relaxed),
            failed_polls: self.failed_polls.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Totals reported when a run stops
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Successful inventory polls, including the final converged one
    pub polls: usize,
    pub failed_polls: usize,
    pub dispatched: usize,
    pub drained: usize,
    /// Node attempts that failed at re-fetch, cordon or drain
    pub failed: usize,
}

/// Shared state for the drain loop
pub struct ControllerState {
    pub inventory: Arc<dyn NodeInventory>,
    pub drainer: Arc<dyn DrainProvider>,
    pub config: DrainConfig,
    pub claims: ClaimSet,
    pub stats: RunStats,
    phase: watch::Sender<RunPhase>,
}

impl ControllerState {
    pub fn new(
        inventory: Arc<dyn NodeInventory>,
        drainer: Arc<dyn DrainProvider>,
        config: DrainConfig,
    ) -> Self {
        let (phase, _) = watch::channel(RunPhase::Running);
        Self {
            inventory,
            drainer,
            config,
            claims: ClaimSet::new(),
            stats: RunStats::default(),
            phase,
        }
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    /// Observe phase transitions
    pub fn subscribe_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    pub(crate) fn set_phase(&self, phase: RunPhase) {
        debug!("Drain loop phase: {}", phase);
        self.phase.send_replace(phase);
    }
}
