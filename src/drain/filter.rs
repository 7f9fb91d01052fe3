//! Pod selection for a drain, following `kubectl drain` rules
//!
//! Each pod on the node is either evicted, skipped with a reason, or blocks the
//! whole drain. A single blocking pod aborts the drain before anything is
//! evicted.

use std::fmt;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use super::DrainOptions;

pub const MIRROR_POD_ANNOTATION: &str = "kubernetes.io/config.mirror";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    DaemonSet,
    MirrorPod,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DaemonSet => write!(f, "managed by a DaemonSet"),
            SkipReason::MirrorPod => write!(f, "static mirror pod"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockReason {
    DaemonSet,
    LocalStorage,
    Unreplicated,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::DaemonSet => write!(f, "cannot delete DaemonSet-managed Pods"),
            BlockReason::LocalStorage => write!(f, "cannot delete Pods with local storage"),
            BlockReason::Unreplicated => write!(f, "cannot delete Pods that declare no controller"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodDisposition {
    Evict,
    Skip(SkipReason),
    Block(BlockReason),
}

/// Pods partitioned by what a drain will do with them
#[derive(Debug, Default)]
pub struct DrainPlan {
    pub evict: Vec<Pod>,
    pub skipped: Vec<(String, SkipReason)>,
    pub blocked: Vec<(String, BlockReason)>,
}

impl DrainPlan {
    pub fn is_blocked(&self) -> bool {
        !self.blocked.is_empty()
    }

    /// Human-readable list of blocking pods grouped by reason
    pub fn blocked_summary(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        for reason in [
            BlockReason::DaemonSet,
            BlockReason::LocalStorage,
            BlockReason::Unreplicated,
        ] {
            let pods: Vec<&str> = self
                .blocked
                .iter()
                .filter(|(_, r)| *r == reason)
                .map(|(name, _)| name.as_str())
                .collect();
            if !pods.is_empty() {
                parts.push(format!("{} ({})", reason, pods.join(", ")));
            }
        }
        parts.join("; ")
    }
}

fn is_completed(pod: &Pod) -> bool {
    matches!(
        pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        Some("Succeeded") | Some("Failed")
    )
}

fn controller_kind(pod: &Pod) -> Option<&str> {
    pod.metadata
        .owner_references
        .as_ref()?
        .iter()
        .find(|r| r.controller == Some(true))
        .map(|r| r.kind.as_str())
}

fn has_empty_dir(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.volumes.as_ref())
        .map(|volumes| volumes.iter().any(|v| v.empty_dir.is_some()))
        .unwrap_or(false)
}

/// Decide what to do with one pod on a node being drained
pub fn classify_pod(pod: &Pod, options: &DrainOptions) -> PodDisposition {
    let kind = controller_kind(pod);

    if kind == Some("DaemonSet") {
        // The DaemonSet controller ignores cordons and would recreate the pod
        return if options.ignore_daemonsets {
            PodDisposition::Skip(SkipReason::DaemonSet)
        } else {
            PodDisposition::Block(BlockReason::DaemonSet)
        };
    }

    if pod.annotations().contains_key(MIRROR_POD_ANNOTATION) {
        return PodDisposition::Skip(SkipReason::MirrorPod);
    }

    if is_completed(pod) {
        return PodDisposition::Evict;
    }

    if has_empty_dir(pod) && !options.delete_empty_dir_data {
        return PodDisposition::Block(BlockReason::LocalStorage);
    }

    if kind.is_none() && !options.force {
        return PodDisposition::Block(BlockReason::Unreplicated);
    }

    PodDisposition::Evict
}

/// Partition the pods found on a node
pub fn plan_drain(pods: impl IntoIterator<Item = Pod>, options: &DrainOptions) -> DrainPlan {
    let mut plan = DrainPlan::default();
    for pod in pods {
        let name = format!(
            "{}/{}",
            pod.namespace().unwrap_or_else(|| "default".to_string()),
            pod.name_any()
        );
        match classify_pod(&pod, options) {
            PodDisposition::Evict => plan.evict.push(pod),
            PodDisposition::Skip(reason) => plan.skipped.push((name, reason)),
            PodDisposition::Block(reason) => plan.blocked.push((name, reason)),
        }
    }
    plan
}
