use crate::membership::types::NodeId;
use crate::snapshots::entry::SnapshotState;
use crate::snapshots::types::{ShardState, SnapshotId};
use serde::{Deserialize, Serialize};

/// Client-visible progress stage of one shard.
///
/// Coarser than the registry's `ShardState`: clients see where the data copy
/// stands, not the internal queueing mechanics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SnapshotStage {
    Init,
    Started,
    /// Shard data fully written but completion not yet durably recorded by
    /// the coordinator. Never reported as `Done` before the coordinator
    /// agrees.
    Finalize,
    Done,
    Failure,
}

/// Byte/file counters and timings for one shard snapshot.
///
/// `incremental_*` counts only what this snapshot had to copy on top of
/// artifacts already present from earlier snapshots; `total_*` covers the
/// whole shard; `processed_*` tracks copy progress.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardStats {
    pub start_time: u64,
    pub total_time_millis: u64,
    pub incremental_file_count: u64,
    pub total_file_count: u64,
    pub processed_file_count: u64,
    pub incremental_size: u64,
    pub total_size: u64,
    pub processed_size: u64,
}

/// One shard's line in a status response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardStatus {
    pub index: String,
    pub shard: u32,
    pub stage: SnapshotStage,
    pub node: Option<NodeId>,
    pub failure_reason: Option<String>,
    pub stats: ShardStats,
}

/// One snapshot's full status: live, reconstructed, or historical.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotStatus {
    pub snapshot: SnapshotId,
    pub repository: String,
    pub state: SnapshotState,
    pub include_global_state: bool,
    pub start_time: u64,
    pub duration_millis: u64,
    pub shards: Vec<ShardStatus>,
}

/// Coarse reconstruction used when no live node detail is available: the
/// registry's shard state alone determines the stage.
pub fn stage_for(state: ShardState) -> SnapshotStage {
    match state {
        ShardState::Failed | ShardState::Aborted | ShardState::Missing => SnapshotStage::Failure,
        ShardState::Init | ShardState::Waiting | ShardState::Queued => SnapshotStage::Started,
        ShardState::Started => SnapshotStage::Started,
        ShardState::Success => SnapshotStage::Done,
    }
}
