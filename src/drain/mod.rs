//! Cordon and drain of a single node
//!
//! Draining is done client side, the way `kubectl drain` does it: mark the
//! node unschedulable, then evict every evictable pod through the Eviction API
//! (which respects PodDisruptionBudgets) and wait for the pods to go away.

pub mod filter;

use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::{
    api::{Api, DeleteParams, EvictParams, ListParams},
    client::Client,
    ResourceExt,
};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::inventory::NodeDescriptor;

pub use filter::{classify_pod, plan_drain, BlockReason, DrainPlan, PodDisposition, SkipReason};

/// Default pod termination grace period passed with each eviction
pub const DEFAULT_GRACE_PERIOD_SECONDS: u32 = 30;

/// Maximum number of pods evicted concurrently on one node
const CONCURRENT_EVICTIONS: usize = 16;

/// Wait between eviction attempts refused by a PodDisruptionBudget
const EVICTION_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Poll interval while waiting for evicted pods to disappear
const DELETION_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Eviction and pod-selection policy
#[derive(Clone, Debug)]
pub struct DrainOptions {
    /// Evict pods without a controller
    pub force: bool,
    /// Leave DaemonSet-managed pods in place instead of failing the drain
    pub ignore_daemonsets: bool,
    /// Evict pods using emptyDir volumes, losing their data
    pub delete_empty_dir_data: bool,
    /// Overrides each pod's own grace period; `None` keeps the pod's value
    pub grace_period_seconds: Option<u32>,
    /// Upper bound on a whole drain; `None` waits indefinitely
    pub timeout: Option<Duration>,
    pub eviction_retry_interval: Duration,
    pub deletion_check_interval: Duration,
}

impl Default for DrainOptions {
    fn default() -> Self {
        Self {
            force: false,
            ignore_daemonsets: true,
            delete_empty_dir_data: true,
            grace_period_seconds: Some(DEFAULT_GRACE_PERIOD_SECONDS),
            timeout: None,
            eviction_retry_interval: EVICTION_RETRY_INTERVAL,
            deletion_check_interval: DELETION_CHECK_INTERVAL,
        }
    }
}

/// Performs the disruptive part of retiring a node
///
/// Both calls may be repeated: cordoning a cordoned node and draining an
/// already empty node succeed.
#[async_trait]
pub trait DrainProvider: Send + Sync {
    /// Mark the node unschedulable
    async fn cordon(&self, node: &NodeDescriptor) -> Result<()>;

    /// Evict all evictable workloads from the node and wait for them to leave
    async fn drain(&self, node_name: &str) -> Result<()>;
}

/// Drain provider talking to the Kubernetes API server
#[derive(Clone)]
pub struct KubeDrainer {
    client: Client,
    options: DrainOptions,
}

impl KubeDrainer {
    pub fn new(client: Client, options: DrainOptions) -> Self {
        Self { client, options }
    }

    async fn drain_node(&self, node_name: &str) -> Result<()> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let on_node = pods
            .list(&ListParams::default().fields(&format!("spec.nodeName={}", node_name)))
            .await
            .map_err(Error::KubeError)?;

        let plan = plan_drain(on_node.items, &self.options);
        if plan.is_blocked() {
            return Err(Error::DrainError {
                node: node_name.to_string(),
                message: plan.blocked_summary(),
            });
        }

        for (pod, reason) in &plan.skipped {
            warn!("Ignoring pod {} on node {}: {}", pod, node_name, reason);
        }

        if plan.evict.is_empty() {
            debug!("No pods to evict on node {}", node_name);
            return Ok(());
        }

        info!("Evicting {} pods from node {}", plan.evict.len(), node_name);

        let results: Vec<Result<()>> = stream::iter(plan.evict)
            .map(|pod| async move {
                self.evict_pod(&pod).await?;
                self.wait_for_deletion(&pod).await;
                Ok::<(), Error>(())
            })
            .buffer_unordered(CONCURRENT_EVICTIONS)
            .collect()
            .await;

        results.into_iter().collect()
    }

    fn pod_api(&self, pod: &Pod) -> Api<Pod> {
        match pod.namespace() {
            Some(ns) => Api::namespaced(self.client.clone(), &ns),
            None => Api::default_namespaced(self.client.clone()),
        }
    }

    #[instrument(skip(self, pod), fields(pod = %pod.name_any()))]
    async fn evict_pod(&self, pod: &Pod) -> Result<()> {
        let api = self.pod_api(pod);
        let name = pod.name_any();
        let params = EvictParams {
            delete_options: Some(DeleteParams {
                grace_period_seconds: self.options.grace_period_seconds,
                ..Default::default()
            }),
            ..Default::default()
        };

        loop {
            match api.evict(&name, &params).await {
                Ok(_) => {
                    info!("Evicted pod {}", name);
                    return Ok(());
                }
                Err(kube::Error::Api(e)) if e.code == 404 => {
                    debug!("Pod {} already gone", name);
                    return Ok(());
                }
                Err(kube::Error::Api(e)) if e.code == 429 => {
                    warn!(
                        "Eviction of pod {} refused ({}), likely a PodDisruptionBudget; retrying in {}s",
                        name,
                        e.message,
                        self.options.eviction_retry_interval.as_secs()
                    );
                    sleep(self.options.eviction_retry_interval).await;
                }
                Err(e) => {
                    return Err(Error::EvictionError {
                        pod: name,
                        source: e,
                    })
                }
            }
        }
    }

    /// Returns once the pod is gone or has been replaced by a pod with a new UID
    async fn wait_for_deletion(&self, pod: &Pod) {
        let api = self.pod_api(pod);
        let name = pod.name_any();
        let uid = pod.uid();

        loop {
            match api.get(&name).await {
                Err(kube::Error::Api(e)) if e.code == 404 => {
                    debug!("Pod {} deleted", name);
                    return;
                }
                Ok(current) if current.uid() != uid => {
                    debug!("Pod {} replaced", name);
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Could not check whether pod {} was deleted: {}", name, e);
                }
            }
            sleep(self.options.deletion_check_interval).await;
        }
    }
}

#[async_trait]
impl DrainProvider for KubeDrainer {
    #[instrument(skip(self, node), fields(node = %node.name))]
    async fn cordon(&self, node: &NodeDescriptor) -> Result<()> {
        if node.unschedulable {
            debug!("Node {} already cordoned", node.name);
            return Ok(());
        }

        let nodes: Api<Node> = Api::all(self.client.clone());
        nodes.cordon(&node.name).await.map_err(Error::KubeError)?;
        info!("Cordoned node {}", node.name);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn drain(&self, node_name: &str) -> Result<()> {
        match self.options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.drain_node(node_name))
                .await
                .map_err(|_| Error::DrainTimeout {
                    node: node_name.to_string(),
                    timeout,
                })?,
            None => self.drain_node(node_name).await,
        }
    }
}
