//! In-memory inventory and drain provider used by the controller tests

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::state::ControllerState;
use crate::config::DrainConfig;
use crate::drain::DrainProvider;
use crate::error::{Error, Result};
use crate::inventory::{NodeDescriptor, NodeInventory};

pub const OLD_VERSION: &str = "v1.31.0";
pub const NEW_VERSION: &str = "v1.32.0";

pub fn api_error(code: u16, reason: &str, message: &str) -> Error {
    Error::KubeError(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: reason.to_string(),
        code,
    }))
}

/// Cluster model: node name to kubelet version
#[derive(Default)]
pub struct FakeCluster {
    nodes: Mutex<BTreeMap<String, String>>,
    failing_lists: AtomicUsize,
    missing_on_get: Mutex<HashSet<String>>,
    pub list_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
}

impl FakeCluster {
    pub fn with_nodes(nodes: &[(&str, &str)]) -> Arc<Self> {
        let cluster = Self::default();
        {
            let mut map = cluster.nodes.lock().unwrap();
            for (name, version) in nodes {
                map.insert(name.to_string(), version.to_string());
            }
        }
        Arc::new(cluster)
    }

    pub fn set_version(&self, name: &str, version: &str) {
        self.nodes
            .lock()
            .unwrap()
            .insert(name.to_string(), version.to_string());
    }

    pub fn version_of(&self, name: &str) -> Option<String> {
        self.nodes.lock().unwrap().get(name).cloned()
    }

    /// Make the next `n` list calls fail
    pub fn fail_lists(&self, n: usize) {
        self.failing_lists.store(n, Ordering::SeqCst);
    }

    pub fn hide_on_get(&self, name: &str) {
        self.missing_on_get.lock().unwrap().insert(name.to_string());
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeInventory for FakeCluster {
    async fn list(&self, _selector: &str) -> Result<Vec<NodeDescriptor>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let pending_failures = self.failing_lists.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.failing_lists
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(api_error(503, "ServiceUnavailable", "inventory unreachable"));
        }

        Ok(self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .map(|(name, version)| NodeDescriptor::new(name.as_str(), version.as_str()))
            .collect())
    }

    async fn get(&self, name: &str) -> Result<NodeDescriptor> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.missing_on_get.lock().unwrap().contains(name) {
            return Err(Error::NodeNotFound(name.to_string()));
        }
        self.version_of(name)
            .map(|version| NodeDescriptor::new(name, version))
            .ok_or_else(|| Error::NodeNotFound(name.to_string()))
    }
}

/// Drain provider that "upgrades" a node in the fake cluster once drained
pub struct FakeDrainer {
    cluster: Arc<FakeCluster>,
    delay: Duration,
    settle: Duration,
    cordon_failures: Mutex<HashMap<String, usize>>,
    drain_failures: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    busy_nodes: Mutex<HashSet<String>>,
    pub overlapping_calls: AtomicUsize,
    pub cordons: Mutex<Vec<String>>,
    pub drains: Mutex<Vec<String>>,
}

impl FakeDrainer {
    pub fn new(cluster: Arc<FakeCluster>) -> Self {
        Self {
            cluster,
            delay: Duration::ZERO,
            settle: Duration::ZERO,
            cordon_failures: Mutex::default(),
            drain_failures: Mutex::default(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            busy_nodes: Mutex::default(),
            overlapping_calls: AtomicUsize::new(0),
            cordons: Mutex::default(),
            drains: Mutex::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Keep the drain call running this long after the node reports the new version
    pub fn with_settle_time(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn fail_cordon(self, name: &str, times: usize) -> Self {
        self.cordon_failures
            .lock()
            .unwrap()
            .insert(name.to_string(), times);
        self
    }

    pub fn fail_drain(self, name: &str, times: usize) -> Self {
        self.drain_failures
            .lock()
            .unwrap()
            .insert(name.to_string(), times);
        self
    }

    pub fn drain_count(&self, name: &str) -> usize {
        self.drains.lock().unwrap().iter().filter(|n| *n == name).count()
    }

    pub fn total_drains(&self) -> usize {
        self.drains.lock().unwrap().len()
    }

    fn enter(&self, name: &str) {
        if !self.busy_nodes.lock().unwrap().insert(name.to_string()) {
            self.overlapping_calls.fetch_add(1, Ordering::SeqCst);
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self, name: &str) {
        self.busy_nodes.lock().unwrap().remove(name);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn take_failure(failures: &Mutex<HashMap<String, usize>>, name: &str) -> bool {
        let mut failures = failures.lock().unwrap();
        match failures.get_mut(name) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl DrainProvider for FakeDrainer {
    async fn cordon(&self, node: &NodeDescriptor) -> Result<()> {
        self.enter(&node.name);
        self.cordons.lock().unwrap().push(node.name.clone());
        let failed = Self::take_failure(&self.cordon_failures, &node.name);
        self.exit(&node.name);

        if failed {
            return Err(api_error(409, "Conflict", "cordon rejected"));
        }
        Ok(())
    }

    async fn drain(&self, node_name: &str) -> Result<()> {
        self.enter(node_name);
        self.drains.lock().unwrap().push(node_name.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failed = Self::take_failure(&self.drain_failures, node_name);
        if !failed {
            self.cluster.set_version(node_name, NEW_VERSION);
            if !self.settle.is_zero() {
                tokio::time::sleep(self.settle).await;
            }
        }
        self.exit(node_name);

        if failed {
            return Err(Error::DrainError {
                node: node_name.to_string(),
                message: "eviction did not complete".to_string(),
            });
        }
        Ok(())
    }
}

pub fn make_state(
    cluster: Arc<FakeCluster>,
    drainer: Arc<FakeDrainer>,
    config: DrainConfig,
) -> Arc<ControllerState> {
    Arc::new(ControllerState::new(cluster, drainer, config))
}

pub fn fast_config(concurrency: usize) -> DrainConfig {
    DrainConfig::new(OLD_VERSION)
        .with_concurrency(concurrency)
        .with_interval(Duration::from_millis(20))
}
