//! Drain loop entry point
//!
//! Starts the worker pool, runs the dispatcher until the cluster converges,
//! then waits for every worker before reporting.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::dispatcher::Dispatcher;
use super::state::{ControllerState, RunPhase, RunSummary};
use super::worker::Worker;
use crate::error::Result;

/// Capacity of the work queue. Kept minimal so the dispatcher only runs ahead
/// of the pool by one node.
const QUEUE_CAPACITY: usize = 1;

/// Main entry point to run the drain loop
///
/// Returns once no node reports the target version and all in-flight work is
/// finished. Cancelling `cancel` stops polling, discards queued nodes, lets
/// in-progress provider calls finish, and returns [`crate::Error::Interrupted`].
pub async fn run_drain_loop(
    state: Arc<ControllerState>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let config = &state.config;
    config.validate()?;
    info!(
        "Starting parallel drain loop for version {} with concurrency {}, checking every {}",
        config.target_version,
        config.concurrency,
        humantime::format_duration(config.interval)
    );

    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let rx = Arc::new(Mutex::new(rx));

    let mut workers = JoinSet::new();
    for id in 0..config.concurrency {
        let worker = Worker::new(id, Arc::clone(&state), Arc::clone(&rx));
        workers.spawn(worker.run(cancel.clone()));
    }
    // Workers hold the only receivers from here on
    drop(rx);

    state.set_phase(RunPhase::Running);
    let result = Dispatcher::new(Arc::clone(&state), tx).run(cancel.clone()).await;

    state.set_phase(RunPhase::DrainingQueue);
    info!("Waiting for {} in-flight nodes", state.claims.len());

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!("Worker task failed: {}", e);
        }
    }
    state.set_phase(RunPhase::Stopped);

    result?;

    let summary = state.stats.summary();
    info!(
        "All matching nodes have been drained ({} drained, {} failed attempts, {} polls)",
        summary.drained, summary.failed, summary.polls
    );
    Ok(summary)
}
