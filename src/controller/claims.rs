//! In-flight tracking of node names
//!
//! A node is claimed from the moment the dispatcher decides to hand it to a
//! worker until the worker is finished with it. Claims are represented by
//! [`ClaimGuard`] values, so whichever path drops the guard (normal
//! completion, an error, a panic in a provider call, or a queued item being
//! discarded) releases the name.

use std::fmt;
use std::sync::Arc;

use dashmap::DashSet;
use tracing::debug;

#[derive(Clone, Default)]
pub struct ClaimSet {
    names: Arc<DashSet<String>>,
}

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically insert `name` if absent. Returns `true` when newly claimed.
    pub fn claim_if_absent(&self, name: &str) -> bool {
        self.names.insert(name.to_string())
    }

    /// Remove `name`. Releasing an unclaimed name is a no-op.
    pub fn release(&self, name: &str) {
        if self.names.remove(name).is_some() {
            debug!("Released claim on node {}", name);
        }
    }

    /// Claim `name` and tie the release to the returned guard
    pub fn claim(&self, name: &str) -> Option<ClaimGuard> {
        self.claim_if_absent(name).then(|| ClaimGuard {
            claims: self.clone(),
            name: name.to_string(),
        })
    }

    pub fn is_claimed(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl fmt::Debug for ClaimSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names.iter().map(|n| n.key().clone())).finish()
    }
}

/// Exclusive ownership of one node name; releases the claim on drop
#[must_use = "dropping a ClaimGuard releases the claim immediately"]
pub struct ClaimGuard {
    claims: ClaimSet,
    name: String,
}

impl ClaimGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ClaimGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClaimGuard").field(&self.name).finish()
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.claims.release(&self.name);
    }
}
