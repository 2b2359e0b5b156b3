use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    foundation::core::NodeId,
    foundation::error::{StageCheckError, StageCheckResult},
};

#[derive(Debug, Default)]
struct RegistryState {
    claimed: BTreeSet<NodeId>,
    open: usize,
}

/// Tracks which nodes are owned by an open session.
///
/// Cloning shares the same registry. A node can belong to at most one open session.
#[derive(Clone, Debug, Default)]
pub struct SessionRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `nodes` exclusively, failing with `SessionConflict` if any is already claimed.
    pub fn acquire(&self, nodes: &[NodeId]) -> StageCheckResult<SessionLease> {
        let mut state = self.lock();
        let conflicts: Vec<NodeId> = nodes
            .iter()
            .filter(|n| state.claimed.contains(*n))
            .cloned()
            .collect();
        if !conflicts.is_empty() {
            return Err(StageCheckError::SessionConflict { nodes: conflicts });
        }

        state.claimed.extend(nodes.iter().cloned());
        state.open += 1;
        Ok(SessionLease {
            registry: self.clone(),
            nodes: nodes.to_vec(),
        })
    }

    pub fn open_sessions(&self) -> usize {
        self.lock().open
    }

    pub fn is_claimed(&self, node: &NodeId) -> bool {
        self.lock().claimed.contains(node)
    }
}

/// Exclusive claim on a node set; released on drop.
#[derive(Debug)]
pub struct SessionLease {
    registry: SessionRegistry,
    nodes: Vec<NodeId>,
}

impl SessionLease {
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let mut state = self.registry.lock();
        for n in &self.nodes {
            state.claimed.remove(n);
        }
        state.open = state.open.saturating_sub(1);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cluster/session.rs"]
mod tests;
