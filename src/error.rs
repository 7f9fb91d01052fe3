//! Error types for parallel-drain

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    KubeError(#[from] kube::Error),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The node is no longer present in the cluster
    #[error("Node {0} not found")]
    NodeNotFound(String),

    /// One or more pods on the node cannot be evicted under the current policy
    #[error("Cannot drain node {node}: {message}")]
    DrainError { node: String, message: String },

    /// Eviction of a single pod was rejected
    #[error("Failed to evict pod {pod}: {source}")]
    EvictionError {
        pod: String,
        #[source]
        source: kube::Error,
    },

    /// Draining did not complete in time
    #[error("Drain of node {node} did not complete within {}s", .timeout.as_secs())]
    DrainTimeout { node: String, timeout: Duration },

    /// Every worker exited while the dispatcher still had work
    #[error("Worker pool stopped accepting work")]
    WorkerPoolClosed,

    /// The run was cancelled before convergence
    #[error("Interrupted before all matching nodes were drained")]
    Interrupted,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
