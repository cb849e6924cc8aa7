use super::types::{ShardSnapshotResult, SnapshotInfo};
use crate::snapshots::types::{RepositoryShardId, SnapshotId};
use anyhow::Result;
use async_trait::async_trait;

/// Read-only window into the blob repository, consumed by the status
/// aggregator when live data is unavailable.
///
/// Implementations must be safe to call concurrently and must never mutate
/// repository state. Calls may block on network I/O, so they run off any
/// latency-sensitive coordination path (in particular, never inside the
/// reducer).
#[async_trait]
pub trait RepositoryReader: Send + Sync {
    /// Resolves a snapshot name against the repository's historical index.
    /// `None` means the name is unknown, which is not an error.
    async fn resolve_snapshot(&self, repository: &str, name: &str) -> Result<Option<SnapshotId>>;

    /// Top-level metadata for a snapshot known to the repository.
    async fn snapshot_info(&self, repository: &str, snapshot: &SnapshotId) -> Result<SnapshotInfo>;

    /// The persisted per-shard outcome, located via the shard's generation.
    async fn shard_snapshot_status(
        &self,
        repository: &str,
        snapshot: &SnapshotId,
        shard: &RepositoryShardId,
    ) -> Result<ShardSnapshotResult>;
}
