//! Discovery loop
//!
//! Polls the inventory on a fixed period, claims nodes reporting the target
//! version and hands them to the worker pool. A poll that sees no matching
//! node at all ends the loop; matching nodes that are still claimed keep it
//! going, since they are only done once their version changes or they leave
//! the cluster.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::claims::ClaimGuard;
use super::state::ControllerState;
use crate::error::{Error, Result};

/// Result of one successful inventory poll
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Nodes reporting the target version, claimed or not
    pub matched: usize,
    /// Nodes newly claimed and queued during this poll
    pub dispatched: usize,
    /// Matching nodes skipped because a worker already owns them
    pub already_claimed: usize,
}

impl PollOutcome {
    pub fn converged(&self) -> bool {
        self.matched == 0
    }
}

pub struct Dispatcher {
    state: Arc<ControllerState>,
    queue: mpsc::Sender<ClaimGuard>,
}

impl Dispatcher {
    pub fn new(state: Arc<ControllerState>, queue: mpsc::Sender<ClaimGuard>) -> Self {
        Self { state, queue }
    }

    /// Poll until convergence or cancellation.
    ///
    /// Consumes the dispatcher so the queue sender is dropped on return, which
    /// is what tells the workers no more work is coming.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let mut ticker = interval(self.state.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Interrupted),
                _ = ticker.tick() => {}
            }

            match self.poll_once(&cancel).await {
                Ok(outcome) if outcome.converged() => {
                    info!("No nodes left reporting version {}", self.state.config.target_version);
                    return Ok(());
                }
                Ok(outcome) => {
                    debug!(
                        "Poll matched {} nodes ({} dispatched, {} already in flight)",
                        outcome.matched, outcome.dispatched, outcome.already_claimed
                    );
                }
                Err(e @ (Error::Interrupted | Error::WorkerPoolClosed)) => return Err(e),
                Err(e) => {
                    self.state.stats.record_failed_poll();
                    error!("Error listing nodes: {}", e);
                }
            }
        }
    }

    /// Run a single discovery cycle
    #[instrument(skip(self, cancel))]
    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<PollOutcome> {
        let config = &self.state.config;
        let nodes = self.state.inventory.list(&config.selector).await?;
        self.state.stats.record_poll();

        let mut outcome = PollOutcome::default();
        for node in nodes {
            if !node.matches_version(&config.target_version) {
                continue;
            }
            outcome.matched += 1;

            let Some(claim) = self.state.claims.claim(&node.name) else {
                debug!("Node {} is already being processed", node.name);
                outcome.already_claimed += 1;
                continue;
            };

            // Blocks while every worker is busy; an abandoned send drops the
            // claim with it
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Interrupted),
                sent = self.queue.send(claim) => {
                    sent.map_err(|_| Error::WorkerPoolClosed)?;
                }
            }
            outcome.dispatched += 1;
            self.state.stats.record_dispatch();
        }

        Ok(outcome)
    }
}
