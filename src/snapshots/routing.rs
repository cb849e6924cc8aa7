use super::types::ShardId;
use crate::membership::types::NodeId;
use std::collections::HashMap;

/// Where a routing shard currently lives, from the (external) allocation
/// layer's point of view. Only the states the snapshot machinery cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardRouting {
    /// Allocated and serving on the node; snapshots may start.
    Started(NodeId),
    /// Allocated but still recovering; snapshots must wait.
    Initializing(NodeId),
    /// Moving between nodes; snapshots stay queued until it settles.
    Relocating(NodeId),
    Unassigned,
}

/// Snapshot-relevant view of the cluster's shard allocation.
///
/// Maintained by the coordinator from allocation updates; shards not present
/// are treated as unassigned. `local` is the coordinating node itself, which
/// is where promoted clone shards run (clones read repository data, not live
/// shards, so they need no routing owner).
#[derive(Debug, Clone)]
pub struct RoutingTable {
    assignments: HashMap<ShardId, ShardRouting>,
    local: NodeId,
}

impl RoutingTable {
    pub fn new(local: NodeId) -> Self {
        Self {
            assignments: HashMap::new(),
            local,
        }
    }

    pub fn local(&self) -> &NodeId {
        &self.local
    }

    pub fn assign(&mut self, shard: ShardId, routing: ShardRouting) {
        self.assignments.insert(shard, routing);
    }

    /// Builder-style variant of [`assign`](Self::assign) for test setup and
    /// initial table construction.
    pub fn with(mut self, shard: ShardId, routing: ShardRouting) -> Self {
        self.assign(shard, routing);
        self
    }

    pub fn remove(&mut self, shard: &ShardId) {
        self.assignments.remove(shard);
    }

    pub fn routing_of(&self, shard: &ShardId) -> ShardRouting {
        self.assignments
            .get(shard)
            .cloned()
            .unwrap_or(ShardRouting::Unassigned)
    }

    /// Looks up an index id by name among the known assignments.
    pub fn index_named(&self, name: &str) -> Option<super::types::IndexId> {
        self.assignments
            .keys()
            .find(|shard| shard.index.name == name)
            .map(|shard| shard.index.clone())
    }
}
