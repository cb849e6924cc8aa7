use super::reader::RepositoryReader;
use super::types::{ShardSnapshotResult, SnapshotInfo};
use crate::snapshots::types::{RepositoryShardId, SnapshotId};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

/// In-memory repository, sufficient for single-process clusters and tests.
///
/// Implements the read-only [`RepositoryReader`] contract; the write side
/// (recording outcomes at acknowledgement time) is deliberately not part of
/// the trait and only exists on the concrete type.
pub struct InMemoryRepository {
    /// `(repository, snapshot uuid) -> SnapshotInfo`
    infos: DashMap<(String, String), SnapshotInfo>,
    /// `(repository, snapshot name) -> SnapshotId`, the historical index.
    names: DashMap<(String, String), SnapshotId>,
    /// `(repository, snapshot uuid, shard) -> persisted outcome`
    shard_results: DashMap<(String, String, RepositoryShardId), ShardSnapshotResult>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            infos: DashMap::new(),
            names: DashMap::new(),
            shard_results: DashMap::new(),
        }
    }

    /// Records a completed snapshot's metadata, making the name resolvable.
    pub fn record_snapshot(&self, repository: &str, info: SnapshotInfo) {
        self.names.insert(
            (repository.to_string(), info.snapshot.name.clone()),
            info.snapshot.clone(),
        );
        self.infos.insert(
            (repository.to_string(), info.snapshot.uuid.clone()),
            info,
        );
    }

    /// Records the persisted outcome of one shard.
    pub fn record_shard_result(
        &self,
        repository: &str,
        snapshot: &SnapshotId,
        shard: RepositoryShardId,
        result: ShardSnapshotResult,
    ) {
        self.shard_results.insert(
            (repository.to_string(), snapshot.uuid.clone(), shard),
            result,
        );
    }

    pub fn snapshot_count(&self) -> usize {
        self.infos.len()
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepositoryReader for InMemoryRepository {
    async fn resolve_snapshot(&self, repository: &str, name: &str) -> Result<Option<SnapshotId>> {
        Ok(self
            .names
            .get(&(repository.to_string(), name.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn snapshot_info(&self, repository: &str, snapshot: &SnapshotId) -> Result<SnapshotInfo> {
        self.infos
            .get(&(repository.to_string(), snapshot.uuid.clone()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                anyhow::anyhow!("No metadata for snapshot {} in [{}]", snapshot, repository)
            })
    }

    async fn shard_snapshot_status(
        &self,
        repository: &str,
        snapshot: &SnapshotId,
        shard: &RepositoryShardId,
    ) -> Result<ShardSnapshotResult> {
        self.shard_results
            .get(&(
                repository.to_string(),
                snapshot.uuid.clone(),
                shard.clone(),
            ))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No persisted data for shard {:?} of snapshot {} in [{}]",
                    shard,
                    snapshot,
                    repository
                )
            })
    }
}
