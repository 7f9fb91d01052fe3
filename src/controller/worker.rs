//! Worker pool member
//!
//! Workers share one receiver and process nodes one at a time: re-read the
//! node, cordon it, drain it. Failures are logged and contained here; the
//! claim is released whatever happens so a later poll can retry the node.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::claims::ClaimGuard;
use super::state::ControllerState;

pub type WorkQueue = Arc<Mutex<mpsc::Receiver<ClaimGuard>>>;

/// Terminal result of one node attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeOutcome {
    Drained,
    GetFailed,
    CordonFailed,
    DrainFailed,
    /// Cancelled between steps
    Abandoned,
}

pub struct Worker {
    id: usize,
    state: Arc<ControllerState>,
    queue: WorkQueue,
}

impl Worker {
    pub fn new(id: usize, state: Arc<ControllerState>, queue: WorkQueue) -> Self {
        Self { id, state, queue }
    }

    /// Consume the queue until it is closed and empty, or until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = async { self.queue.lock().await.recv().await } => item,
            };
            let Some(claim) = next else {
                break;
            };

            match self.process(claim, &cancel).await {
                NodeOutcome::Drained => self.state.stats.record_drained(),
                NodeOutcome::Abandoned => {}
                _ => self.state.stats.record_failure(),
            }
        }
        debug!("Worker {} exiting", self.id);
    }

    /// Retire one node. The claim is released when this returns.
    #[instrument(skip(self, claim, cancel), fields(worker = self.id, node = %claim.name()))]
    pub async fn process(&self, claim: ClaimGuard, cancel: &CancellationToken) -> NodeOutcome {
        let name = claim.name();
        info!("Processing node: {}", name);

        let node = match self.state.inventory.get(name).await {
            Ok(node) => node,
            Err(e) => {
                error!("Error getting node {}: {}", name, e);
                return NodeOutcome::GetFailed;
            }
        };

        if cancel.is_cancelled() {
            warn!("Cancelled before cordoning node {}", name);
            return NodeOutcome::Abandoned;
        }

        if let Err(e) = self.state.drainer.cordon(&node).await {
            error!("Error cordoning {}: {}", name, e);
            return NodeOutcome::CordonFailed;
        }

        if cancel.is_cancelled() {
            warn!("Cancelled before draining node {}, node left cordoned", name);
            return NodeOutcome::Abandoned;
        }

        match self.state.drainer.drain(name).await {
            Ok(()) => {
                info!("Successfully drained node: {}", name);
                NodeOutcome::Drained
            }
            Err(e) => {
                error!("Error draining {}: {}", name, e);
                NodeOutcome::DrainFailed
            }
        }
    }
}
