//! Run configuration
//!
//! Built once at startup from the command line and shared read-only with the
//! dispatcher and workers.

use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrainConfig {
    /// Exact kubelet version identifying nodes to retire
    pub target_version: String,
    /// Label selector passed verbatim to the node list call
    pub selector: String,
    /// Worker pool size, and so the maximum number of nodes drained at once
    pub concurrency: usize,
    /// Period between inventory polls
    pub interval: Duration,
}

impl DrainConfig {
    pub fn new(target_version: impl Into<String>) -> Self {
        Self {
            target_version: target_version.into(),
            selector: String::new(),
            concurrency: DEFAULT_CONCURRENCY,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = selector.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Reject configurations the run loop cannot make progress with
    pub fn validate(&self) -> Result<()> {
        if self.target_version.trim().is_empty() {
            return Err(Error::ConfigError(
                "--old-k8s-version is required".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(Error::ConfigError(
                "--concurrency must be at least 1".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(Error::ConfigError(
                "--interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
