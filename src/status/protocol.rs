//! Status Protocol Definitions
//!
//! DTOs and endpoint constants for the status read path: the public status
//! query and the internal per-node stats fan-out.

use super::types::{ShardStats, SnapshotStage, SnapshotStatus};
use crate::snapshots::types::SnapshotId;
use serde::{Deserialize, Serialize};

/// Internal endpoint answering live per-shard statistics for the snapshots a
/// node is (or was) working on.
pub const ENDPOINT_NODE_STATS: &str = "/internal/snapshot_stats";

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeStatsRequest {
    /// Exactly the snapshots in flight on the queried node, per the
    /// coordinator's registry view.
    pub snapshots: Vec<SnapshotId>,
}

/// Live detail for one shard as tracked on the executing node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeShardStats {
    pub index: String,
    pub shard: u32,
    pub stage: SnapshotStage,
    pub stats: ShardStats,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshotStats {
    pub snapshot: SnapshotId,
    pub shards: Vec<NodeShardStats>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeStatsResponse {
    pub snapshots: Vec<NodeSnapshotStats>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusQueryResponse {
    pub snapshots: Vec<SnapshotStatus>,
    pub error: Option<String>,
}
