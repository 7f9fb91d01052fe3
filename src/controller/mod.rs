//! Controller module for the node drain loop
//! This module contains the discovery loop, the worker pool and the
//! in-flight tracking that keeps them from working on the same node twice.

mod claims;
mod dispatcher;
mod runner;
mod state;
#[cfg(test)]
mod testing;
mod worker;

pub use claims::{ClaimGuard, ClaimSet};
pub use dispatcher::{Dispatcher, PollOutcome};
pub use runner::run_drain_loop;
pub use state::{ControllerState, RunPhase, RunStats, RunSummary};
pub use worker::{NodeOutcome, WorkQueue, Worker};
