use super::protocol::{NodeSnapshotStats, NodeStatsRequest, NodeStatsResponse, ENDPOINT_NODE_STATS};
use super::types::{stage_for, ShardStats, ShardStatus, SnapshotStage, SnapshotStatus};
use crate::coordinator::state::ClusterState;
use crate::membership::service::MembershipService;
use crate::membership::types::NodeId;
use crate::repository::reader::RepositoryReader;
use crate::snapshots::entry::{SnapshotEntry, SnapshotState};
use crate::snapshots::types::{now_ms, ShardState, SnapshotId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure reason recorded for shards of a failed non-partial snapshot that
/// never wrote any data. Reading the repository for them would find nothing.
const SKIPPED_REASON: &str = "skipped";

/// The only errors a status query surfaces. Everything else (dead nodes,
/// stale registry entries, opportunistic stat-refresh failures) degrades to
/// a coarser answer instead.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("snapshot [{name}] is missing from repository [{repository}]")]
    SnapshotMissing { repository: String, name: String },

    #[error("failed to read snapshot [{name}] from repository [{repository}]: {reason}")]
    RepositoryRead {
        repository: String,
        name: String,
        reason: String,
    },
}

/// The client-facing status read path.
///
/// For operations still in the registry it fans out to the nodes doing the
/// work for live byte/file counters; for anything else it reconstructs
/// status from repository-persisted metadata. A query returns a best-effort
/// merged view or fails atomically; it never silently omits a requested,
/// resolvable snapshot.
pub struct StatusService {
    state: Arc<ClusterState>,
    membership: Arc<MembershipService>,
    repository_reader: Arc<dyn RepositoryReader>,
    http_client: reqwest::Client,
    node_timeout: Duration,
}

impl StatusService {
    pub fn new(
        state: Arc<ClusterState>,
        membership: Arc<MembershipService>,
        repository_reader: Arc<dyn RepositoryReader>,
    ) -> Arc<Self> {
        let node_timeout = state.config().node_status_timeout;
        Arc::new(Self {
            state,
            membership,
            repository_reader,
            http_client: reqwest::Client::new(),
            node_timeout,
        })
    }

    /// Resolves status for `names` in `repository`. Empty `names` means all
    /// in-progress operations. Results preserve the requested name order.
    pub async fn get_status(
        &self,
        repository: &str,
        names: &[String],
        ignore_unavailable: bool,
    ) -> Result<Vec<SnapshotStatus>, StatusError> {
        let registry = self.state.current().await;

        let matched: Vec<SnapshotEntry> = if names.is_empty() {
            registry.for_repository(repository).cloned().collect()
        } else {
            names
                .iter()
                .filter_map(|name| registry.find_by_name(repository, name))
                .cloned()
                .collect()
        };

        let replies = self.collect_node_stats(&matched).await;

        let mut results = Vec::new();
        if names.is_empty() {
            for entry in &matched {
                results.push(self.live_status(entry, &replies).await);
            }
            return Ok(results);
        }

        for name in names {
            if let Some(entry) = matched.iter().find(|entry| &entry.snapshot.name == name) {
                results.push(self.live_status(entry, &replies).await);
                continue;
            }

            match self.historical_status(repository, name).await? {
                Some(status) => results.push(status),
                None => {
                    if !ignore_unavailable {
                        return Err(StatusError::SnapshotMissing {
                            repository: repository.to_string(),
                            name: name.clone(),
                        });
                    }
                    tracing::debug!("Skipping unknown snapshot [{}] in [{}]", name, repository);
                }
            }
        }

        Ok(results)
    }

    /// Scatter-gather to every node referenced by the matched entries, one
    /// request per node listing exactly the snapshots in flight there. A
    /// slow or dead node degrades status precision, never the response.
    async fn collect_node_stats(
        &self,
        entries: &[SnapshotEntry],
    ) -> HashMap<NodeId, Vec<NodeSnapshotStats>> {
        let mut per_node: HashMap<NodeId, Vec<SnapshotId>> = HashMap::new();
        for entry in entries {
            for (_, status) in entry.shard_view() {
                if let Some(node) = &status.node {
                    let snapshots = per_node.entry(node.clone()).or_default();
                    if !snapshots.contains(&entry.snapshot) {
                        snapshots.push(entry.snapshot.clone());
                    }
                }
            }
        }

        let mut handles = Vec::new();
        for (node, snapshots) in per_node {
            let Some(addr) = self.membership.http_addr_of(&node) else {
                tracing::warn!("No address for node {:?}, skipping stats fan-out", node);
                continue;
            };

            let client = self.http_client.clone();
            let timeout = self.node_timeout;
            handles.push(tokio::spawn(async move {
                let response = client
                    .post(format!("http://{}{}", addr, ENDPOINT_NODE_STATS))
                    .json(&NodeStatsRequest { snapshots })
                    .timeout(timeout)
                    .send()
                    .await?;

                if !response.status().is_success() {
                    anyhow::bail!("Node stats request failed: {}", response.status());
                }

                let parsed: NodeStatsResponse = response.json().await?;
                Ok::<_, anyhow::Error>((node, parsed.snapshots))
            }));
        }

        let mut replies = HashMap::new();
        for handle in handles {
            match handle.await {
                Ok(Ok((node, snapshots))) => {
                    replies.insert(node, snapshots);
                }
                Ok(Err(e)) => {
                    // The node falls through to registry reconstruction.
                    tracing::warn!("Node stats fan-out failed: {}", e);
                }
                Err(e) => {
                    tracing::warn!("Node stats task aborted: {}", e);
                }
            }
        }
        replies
    }

    /// Builds status for an in-progress entry from node replies, falling
    /// back per shard to registry reconstruction. Never fails: missing
    /// detail only coarsens the answer.
    pub(crate) async fn live_status(
        &self,
        entry: &SnapshotEntry,
        replies: &HashMap<NodeId, Vec<NodeSnapshotStats>>,
    ) -> SnapshotStatus {
        let mut shards = Vec::new();

        for (repo_shard, recorded) in entry.shard_view() {
            let live = recorded
                .node
                .as_ref()
                .and_then(|node| replies.get(node))
                .and_then(|snapshots| {
                    snapshots
                        .iter()
                        .find(|group| group.snapshot == entry.snapshot)
                })
                .and_then(|group| {
                    group.shards.iter().find(|shard| {
                        shard.index == repo_shard.index.name && shard.shard == repo_shard.shard
                    })
                });

            let shard_status = match live {
                Some(detail) => {
                    let mut stage = detail.stage;
                    // The node finished writing but the coordinator has not
                    // durably recorded completion; a client must not be told
                    // Done before the coordinator agrees.
                    if stage == SnapshotStage::Done && recorded.state != ShardState::Success {
                        stage = SnapshotStage::Finalize;
                    }
                    ShardStatus {
                        index: repo_shard.index.name.clone(),
                        shard: repo_shard.shard,
                        stage,
                        node: recorded.node.clone(),
                        failure_reason: detail
                            .failure_reason
                            .clone()
                            .or_else(|| recorded.failure_reason.clone()),
                        stats: detail.stats.clone(),
                    }
                }
                None => {
                    let stage = stage_for(recorded.state);
                    let stats = if stage == SnapshotStage::Done {
                        // Completed shard, no live detail: fetch the exact
                        // persisted numbers rather than fabricating them.
                        match self
                            .repository_reader
                            .shard_snapshot_status(
                                &entry.repository,
                                &entry.snapshot,
                                &repo_shard,
                            )
                            .await
                        {
                            Ok(result) => result.stats,
                            Err(e) => {
                                tracing::warn!(
                                    "Stats unavailable for shard {:?} of {}: {}",
                                    repo_shard,
                                    entry.snapshot,
                                    e
                                );
                                ShardStats::default()
                            }
                        }
                    } else {
                        ShardStats::default()
                    };

                    ShardStatus {
                        index: repo_shard.index.name.clone(),
                        shard: repo_shard.shard,
                        stage,
                        node: recorded.node.clone(),
                        failure_reason: recorded.failure_reason.clone(),
                        stats,
                    }
                }
            };

            shards.push(shard_status);
        }

        SnapshotStatus {
            snapshot: entry.snapshot.clone(),
            repository: entry.repository.clone(),
            state: entry.state,
            include_global_state: entry.include_global_state,
            start_time: entry.start_time,
            duration_millis: now_ms().saturating_sub(entry.start_time),
            shards,
        }
    }

    /// Reconstructs status for a snapshot no longer in the registry from
    /// repository metadata. `Ok(None)` means the name resolves to nothing.
    pub(crate) async fn historical_status(
        &self,
        repository: &str,
        name: &str,
    ) -> Result<Option<SnapshotStatus>, StatusError> {
        let read_error = |reason: String| StatusError::RepositoryRead {
            repository: repository.to_string(),
            name: name.to_string(),
            reason,
        };

        let Some(snapshot) = self
            .repository_reader
            .resolve_snapshot(repository, name)
            .await
            .map_err(|e| read_error(e.to_string()))?
        else {
            return Ok(None);
        };

        let info = self
            .repository_reader
            .snapshot_info(repository, &snapshot)
            .await
            .map_err(|e| read_error(e.to_string()))?;

        let mut shards = Vec::new();
        for shard in &info.shards {
            let shard_status = if let Some(failure) = info.failure_for(shard) {
                ShardStatus {
                    index: shard.index.name.clone(),
                    shard: shard.shard,
                    stage: SnapshotStage::Failure,
                    node: failure.node.clone(),
                    failure_reason: Some(failure.reason.clone()),
                    stats: ShardStats::default(),
                }
            } else if info.state == SnapshotState::Failed {
                // Nothing was written for this shard; don't attempt a read
                // that would not find data.
                ShardStatus {
                    index: shard.index.name.clone(),
                    shard: shard.shard,
                    stage: SnapshotStage::Failure,
                    node: None,
                    failure_reason: Some(SKIPPED_REASON.to_string()),
                    stats: ShardStats::default(),
                }
            } else {
                let result = self
                    .repository_reader
                    .shard_snapshot_status(repository, &snapshot, shard)
                    .await
                    .map_err(|e| read_error(e.to_string()))?;
                ShardStatus {
                    index: shard.index.name.clone(),
                    shard: shard.shard,
                    stage: result.stage,
                    node: None,
                    failure_reason: result.failure_reason,
                    stats: result.stats,
                }
            };

            shards.push(shard_status);
        }

        Ok(Some(SnapshotStatus {
            snapshot: info.snapshot.clone(),
            repository: repository.to_string(),
            state: info.state,
            include_global_state: info.include_global_state,
            start_time: info.start_time,
            duration_millis: info.duration_millis(),
            shards,
        }))
    }
}
