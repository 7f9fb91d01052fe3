//! Read-only view of cluster nodes
//!
//! The coordination loop only needs a node's name and the kubelet version it
//! reports, so everything else on the `Node` object is dropped at the boundary.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::{
    api::{Api, ListParams},
    client::Client,
    ResourceExt,
};
use tracing::{debug, instrument};

use crate::error::{Error, Result};

/// Snapshot of a node as seen by a single inventory read
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub name: String,
    /// `status.nodeInfo.kubeletVersion`, empty when the node has no status yet
    pub reported_version: String,
    pub unschedulable: bool,
}

impl NodeDescriptor {
    pub fn new(name: impl Into<String>, reported_version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reported_version: reported_version.into(),
            unschedulable: false,
        }
    }

    /// Exact string comparison; `v1.32.0` does not match `v1.32.0-eks-1234`
    pub fn matches_version(&self, target: &str) -> bool {
        self.reported_version == target
    }
}

impl From<&Node> for NodeDescriptor {
    fn from(node: &Node) -> Self {
        let reported_version = node
            .status
            .as_ref()
            .and_then(|s| s.node_info.as_ref())
            .map(|info| info.kubelet_version.clone())
            .unwrap_or_default();
        let unschedulable = node
            .spec
            .as_ref()
            .and_then(|s| s.unschedulable)
            .unwrap_or(false);

        Self {
            name: node.name_any(),
            reported_version,
            unschedulable,
        }
    }
}

/// Source of node descriptors
#[async_trait]
pub trait NodeInventory: Send + Sync {
    /// List nodes matching a label selector. An empty selector lists every node.
    async fn list(&self, selector: &str) -> Result<Vec<NodeDescriptor>>;

    /// Fetch the current state of one node
    async fn get(&self, name: &str) -> Result<NodeDescriptor>;
}

/// Inventory backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeInventory {
    nodes: Api<Node>,
}

impl KubeInventory {
    pub fn new(client: Client) -> Self {
        Self {
            nodes: Api::all(client),
        }
    }
}

#[async_trait]
impl NodeInventory for KubeInventory {
    #[instrument(skip(self))]
    async fn list(&self, selector: &str) -> Result<Vec<NodeDescriptor>> {
        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(selector);
        }

        let nodes = self
            .nodes
            .list(&params)
            .await
            .map_err(Error::KubeError)?;

        debug!("Listed {} nodes", nodes.items.len());
        Ok(nodes.items.iter().map(NodeDescriptor::from).collect())
    }

    #[instrument(skip(self))]
    async fn get(&self, name: &str) -> Result<NodeDescriptor> {
        match self.nodes.get(name).await {
            Ok(node) => Ok(NodeDescriptor::from(&node)),
            Err(kube::Error::Api(err)) if err.code == 404 => {
                Err(Error::NodeNotFound(name.to_string()))
            }
            Err(e) => Err(Error::KubeError(e)),
        }
    }
}
