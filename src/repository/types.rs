use crate::membership::types::NodeId;
use crate::snapshots::entry::SnapshotState;
use crate::snapshots::types::{IndexId, RepositoryShardId, ShardGeneration, SnapshotId};
use crate::status::types::{ShardStats, SnapshotStage};
use serde::{Deserialize, Serialize};

/// The persisted outcome of one shard snapshot, read back from the
/// repository. Only terminal stages exist here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardSnapshotResult {
    pub stage: SnapshotStage,
    pub generation: Option<ShardGeneration>,
    pub stats: ShardStats,
    pub failure_reason: Option<String>,
}

impl ShardSnapshotResult {
    pub fn done(generation: ShardGeneration, stats: ShardStats) -> Self {
        Self {
            stage: SnapshotStage::Done,
            generation: Some(generation),
            stats,
            failure_reason: None,
        }
    }

    pub fn failure(reason: &str) -> Self {
        Self {
            stage: SnapshotStage::Failure,
            generation: None,
            stats: ShardStats::default(),
            failure_reason: Some(reason.to_string()),
        }
    }
}

/// A shard-level failure recorded in the snapshot's repository metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardFailure {
    pub shard: RepositoryShardId,
    pub node: Option<NodeId>,
    pub reason: String,
}

/// Repository-persisted metadata for a completed (or failed) snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub snapshot: SnapshotId,
    pub state: SnapshotState,
    pub start_time: u64,
    pub end_time: u64,
    pub include_global_state: bool,
    pub indices: Vec<IndexId>,
    pub shards: Vec<RepositoryShardId>,
    pub failures: Vec<ShardFailure>,
}

impl SnapshotInfo {
    pub fn failure_for(&self, shard: &RepositoryShardId) -> Option<&ShardFailure> {
        self.failures.iter().find(|failure| &failure.shard == shard)
    }

    pub fn duration_millis(&self) -> u64 {
        self.end_time.saturating_sub(self.start_time)
    }
}
