use crate::snapshots::entry::{SnapshotEntry, SnapshotsInProgress};
use crate::snapshots::reducer::{
    apply_routing_change, apply_shard_reports, promote_queued_shards, ShardProgressReport,
};
use crate::snapshots::routing::RoutingTable;
use crate::snapshots::types::{
    now_ms, IndexId, RepositoryShardId, ShardId, ShardSnapshotStatus, SnapshotId,
};
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Tunables for the snapshot subsystem.
#[derive(Debug, Clone)]
pub struct SnapshotClusterConfig {
    /// Per-repository cap on concurrently running shard snapshots. The only
    /// admission-control limit here: exceeding it delays chaining, it never
    /// fails an operation.
    pub max_concurrent_shard_snapshots: usize,
    /// Per-node timeout for the status fan-out.
    pub node_status_timeout: Duration,
    /// Delivery attempts for worker progress reports.
    pub report_retry_attempts: usize,
}

impl Default for SnapshotClusterConfig {
    fn default() -> Self {
        Self {
            max_concurrent_shard_snapshots: 8,
            node_status_timeout: Duration::from_secs(2),
            report_retry_attempts: 3,
        }
    }
}

/// The single-writer holder of the snapshot registry.
///
/// Readers take the current `Arc` and work on a consistent value without
/// holding any lock. All mutation funnels through the write lock, one reducer
/// application at a time, and never performs network I/O while holding it.
pub struct ClusterState {
    registry: RwLock<Arc<SnapshotsInProgress>>,
    routing: RwLock<RoutingTable>,
    config: SnapshotClusterConfig,
}

impl ClusterState {
    pub fn new(routing: RoutingTable, config: SnapshotClusterConfig) -> Arc<Self> {
        Arc::new(Self {
            registry: RwLock::new(Arc::new(SnapshotsInProgress::empty())),
            routing: RwLock::new(routing),
            config,
        })
    }

    pub fn config(&self) -> &SnapshotClusterConfig {
        &self.config
    }

    /// The current registry value. Cheap; callers keep the `Arc` for as long
    /// as they need a consistent view.
    pub async fn current(&self) -> Arc<SnapshotsInProgress> {
        self.registry.read().await.clone()
    }

    /// Installs a registry value published by the replication layer. Follower
    /// nodes receive the coordinator's value through this; they never run the
    /// reducer themselves.
    pub async fn install(&self, registry: Arc<SnapshotsInProgress>) {
        *self.registry.write().await = registry;
    }

    /// Admits a new plain snapshot. Every shard starts out queued; the same
    /// chaining pass used by the reducer then fills whatever capacity the
    /// repository has left, so shards come up Init/Waiting/Missing/Queued
    /// according to routing and budget.
    pub async fn start_snapshot(
        &self,
        repository: &str,
        name: &str,
        indices: &[(String, u32)],
        include_global_state: bool,
        partial: bool,
    ) -> Result<SnapshotId> {
        let mut registry = self.registry.write().await;
        if registry.find_by_name(repository, name).is_some() {
            anyhow::bail!(
                "snapshot [{}] is already in progress in repository [{}]",
                name,
                repository
            );
        }

        let routing = self.routing.read().await;
        let snapshot = SnapshotId::new(name);
        let mut shards = BTreeMap::new();
        let mut index_ids = Vec::new();
        for (index_name, shard_count) in indices {
            let index = routing
                .index_named(index_name)
                .unwrap_or_else(|| IndexId::new(index_name));
            index_ids.push(index.clone());
            for shard in 0..*shard_count {
                shards.insert(
                    ShardId {
                        index: index.clone(),
                        shard,
                    },
                    ShardSnapshotStatus::queued(),
                );
            }
        }

        let entry = SnapshotEntry::new_snapshot(
            repository,
            snapshot.clone(),
            index_ids,
            shards,
            include_global_state,
            partial,
            now_ms(),
        );

        let mut next = registry.with_entry(entry);
        promote_queued_shards(
            &mut next,
            &routing,
            self.config.max_concurrent_shard_snapshots,
        );
        *registry = Arc::new(next);

        tracing::info!("Accepted snapshot {} in [{}]", snapshot, repository);
        Ok(snapshot)
    }

    /// Admits a clone of an already-persisted snapshot. The caller resolves
    /// the source's shard list from repository metadata beforehand; clones
    /// never touch live routing shards.
    pub async fn start_clone(
        &self,
        repository: &str,
        name: &str,
        source: SnapshotId,
        shards: Vec<RepositoryShardId>,
    ) -> Result<SnapshotId> {
        let mut registry = self.registry.write().await;
        if registry.find_by_name(repository, name).is_some() {
            anyhow::bail!(
                "snapshot [{}] is already in progress in repository [{}]",
                name,
                repository
            );
        }

        let routing = self.routing.read().await;
        let snapshot = SnapshotId::new(name);
        let mut clones = BTreeMap::new();
        for shard in shards {
            clones.insert(shard, ShardSnapshotStatus::queued());
        }

        let entry = SnapshotEntry::new_clone(
            repository,
            snapshot.clone(),
            source.clone(),
            clones,
            now_ms(),
        );

        let mut next = registry.with_entry(entry);
        promote_queued_shards(
            &mut next,
            &routing,
            self.config.max_concurrent_shard_snapshots,
        );
        *registry = Arc::new(next);

        tracing::info!(
            "Accepted clone {} of {} in [{}]",
            snapshot,
            source,
            repository
        );
        Ok(snapshot)
    }

    /// Runs the reducer over a batch of worker reports. Returns whether the
    /// registry changed; unchanged applications keep the previous `Arc`, so
    /// the replication layer can skip publishing.
    pub async fn apply_reports(&self, reports: &[ShardProgressReport]) -> bool {
        let mut registry = self.registry.write().await;
        let routing = self.routing.read().await;

        let (next, changed) = apply_shard_reports(
            &registry,
            reports,
            &routing,
            self.config.max_concurrent_shard_snapshots,
        );
        if changed {
            *registry = next;
        }
        changed
    }

    /// Applies an allocation update and folds its consequences (waiting
    /// shards starting, vanished shards failing, freed capacity chaining)
    /// into the registry.
    pub async fn update_routing<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut RoutingTable),
    {
        let mut registry = self.registry.write().await;
        let mut routing = self.routing.write().await;
        update(&mut routing);

        let (next, changed) = apply_routing_change(
            &registry,
            &routing,
            self.config.max_concurrent_shard_snapshots,
        );
        if changed {
            *registry = next;
        }
        changed
    }

    /// Removes a terminal entry from the registry and hands it back so the
    /// caller can persist its outcome first. After this, the snapshot's
    /// status is only reachable through the repository.
    pub async fn acknowledge(&self, repository: &str, name: &str) -> Result<SnapshotEntry> {
        let mut registry = self.registry.write().await;
        let Some(entry) = registry.find_by_name(repository, name).cloned() else {
            anyhow::bail!("snapshot [{}] is not in progress in [{}]", name, repository);
        };
        if !entry.state.is_terminal() {
            anyhow::bail!("snapshot [{}] has not finished yet", name);
        }

        *registry = Arc::new(registry.without_entry(repository, &entry.snapshot));
        tracing::info!("Acknowledged snapshot {} in [{}]", entry.snapshot, repository);
        Ok(entry)
    }
}
