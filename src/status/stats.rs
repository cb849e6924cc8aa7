use super::protocol::{NodeShardStats, NodeSnapshotStats};
use super::types::{ShardStats, SnapshotStage};
use crate::snapshots::types::{now_ms, RepositoryShardId, SnapshotId};
use dashmap::DashMap;

/// Worker-side registry of live shard-snapshot progress.
///
/// The node's shard-snapshot execution path writes stages and counters here;
/// the internal stats endpoint reads them out for the coordinator's status
/// fan-out. Entries survive shard completion (the coordinator may not have
/// recorded it yet) and are dropped when the operation is acknowledged.
pub struct ShardStatsTracker {
    shards: DashMap<(SnapshotId, RepositoryShardId), TrackedShard>,
}

#[derive(Debug, Clone)]
struct TrackedShard {
    stage: SnapshotStage,
    stats: ShardStats,
    failure_reason: Option<String>,
}

impl ShardStatsTracker {
    pub fn new() -> Self {
        Self {
            shards: DashMap::new(),
        }
    }

    /// Begins tracking a shard: the copy is starting now, with known totals.
    pub fn start_shard(
        &self,
        snapshot: &SnapshotId,
        shard: &RepositoryShardId,
        total_file_count: u64,
        total_size: u64,
        incremental_file_count: u64,
        incremental_size: u64,
    ) {
        let stats = ShardStats {
            start_time: now_ms(),
            total_time_millis: 0,
            incremental_file_count,
            total_file_count,
            processed_file_count: 0,
            incremental_size,
            total_size,
            processed_size: 0,
        };
        self.shards.insert(
            (snapshot.clone(), shard.clone()),
            TrackedShard {
                stage: SnapshotStage::Started,
                stats,
                failure_reason: None,
            },
        );
    }

    /// Adds copy progress for a running shard.
    pub fn add_progress(
        &self,
        snapshot: &SnapshotId,
        shard: &RepositoryShardId,
        files: u64,
        bytes: u64,
    ) {
        if let Some(mut tracked) = self.shards.get_mut(&(snapshot.clone(), shard.clone())) {
            tracked.stats.processed_file_count += files;
            tracked.stats.processed_size += bytes;
        }
    }

    /// Marks the data copy finished on this node. The coordinator may still
    /// lag behind; the aggregator downgrades Done to Finalize until the
    /// registry agrees.
    pub fn finish_shard(&self, snapshot: &SnapshotId, shard: &RepositoryShardId) {
        if let Some(mut tracked) = self.shards.get_mut(&(snapshot.clone(), shard.clone())) {
            tracked.stage = SnapshotStage::Done;
            tracked.stats.total_time_millis =
                now_ms().saturating_sub(tracked.stats.start_time);
        }
    }

    pub fn fail_shard(&self, snapshot: &SnapshotId, shard: &RepositoryShardId, reason: &str) {
        if let Some(mut tracked) = self.shards.get_mut(&(snapshot.clone(), shard.clone())) {
            tracked.stage = SnapshotStage::Failure;
            tracked.failure_reason = Some(reason.to_string());
            tracked.stats.total_time_millis =
                now_ms().saturating_sub(tracked.stats.start_time);
        }
    }

    /// Everything this node knows about the requested snapshots, grouped per
    /// snapshot. Snapshots with no local shards are simply absent.
    pub fn stats_for(&self, snapshots: &[SnapshotId]) -> Vec<NodeSnapshotStats> {
        let mut grouped: Vec<NodeSnapshotStats> = Vec::new();

        for entry in self.shards.iter() {
            let (snapshot, shard) = entry.key();
            if !snapshots.contains(snapshot) {
                continue;
            }

            let tracked = entry.value();
            let shard_stats = NodeShardStats {
                index: shard.index.name.clone(),
                shard: shard.shard,
                stage: tracked.stage,
                stats: tracked.stats.clone(),
                failure_reason: tracked.failure_reason.clone(),
            };

            match grouped.iter_mut().find(|group| &group.snapshot == snapshot) {
                Some(group) => group.shards.push(shard_stats),
                None => grouped.push(NodeSnapshotStats {
                    snapshot: snapshot.clone(),
                    shards: vec![shard_stats],
                }),
            }
        }

        grouped
    }

    /// Drops all tracking for an acknowledged operation.
    pub fn clear_snapshot(&self, snapshot: &SnapshotId) {
        self.shards.retain(|(tracked, _), _| tracked != snapshot);
    }

    pub fn tracked_shard_count(&self) -> usize {
        self.shards.len()
    }
}

impl Default for ShardStatsTracker {
    fn default() -> Self {
        Self::new()
    }
}
