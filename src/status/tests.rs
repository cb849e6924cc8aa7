//! Status Module Tests
//!
//! Covers the worker-side stats tracker, the aggregator's merge rules (live
//! detail, the Done -> Finalize downgrade, coarse reconstruction, historical
//! fallback), and one end-to-end fan-out against a real in-process server.

#[cfg(test)]
mod tests {
    use crate::coordinator::state::{ClusterState, SnapshotClusterConfig};
    use crate::membership::service::{MembershipConfig, MembershipService};
    use crate::membership::types::{Node, NodeId, NodeState};
    use crate::repository::memory::InMemoryRepository;
    use crate::repository::reader::RepositoryReader;
    use crate::repository::types::{ShardFailure, ShardSnapshotResult, SnapshotInfo};
    use crate::snapshots::entry::{SnapshotEntry, SnapshotState, SnapshotsInProgress};
    use crate::snapshots::routing::RoutingTable;
    use crate::snapshots::types::{
        now_ms, IndexId, RepositoryShardId, ShardGeneration, ShardId, ShardSnapshotStatus,
        ShardState, SnapshotId,
    };
    use crate::status::aggregator::{StatusError, StatusService};
    use crate::status::protocol::{NodeShardStats, NodeSnapshotStats, ENDPOINT_NODE_STATS};
    use crate::status::stats::ShardStatsTracker;
    use crate::status::types::{stage_for, ShardStats, SnapshotStage};
    use axum::{routing::post, Extension, Router};
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;
    use std::time::Instant;

    const REPO: &str = "backups";

    async fn harness(
        repository: Arc<InMemoryRepository>,
    ) -> (Arc<ClusterState>, Arc<MembershipService>, Arc<StatusService>) {
        let membership = MembershipService::new(
            "127.0.0.1:0".parse().unwrap(),
            "127.0.0.1:9200".parse().unwrap(),
            vec![],
            MembershipConfig::default(),
        )
        .await
        .expect("Failed to create membership");

        let state = ClusterState::new(
            RoutingTable::new(membership.local_node.id.clone()),
            SnapshotClusterConfig::default(),
        );

        let reader: Arc<dyn RepositoryReader> = repository;
        let service = StatusService::new(state.clone(), membership.clone(), reader);
        (state, membership, service)
    }

    fn shard(index: &IndexId, n: u32) -> ShardId {
        ShardId {
            index: index.clone(),
            shard: n,
        }
    }

    fn two_shard_entry(
        name: &str,
        index: &IndexId,
        shard0: ShardSnapshotStatus,
        shard1: ShardSnapshotStatus,
    ) -> SnapshotEntry {
        let mut shards = BTreeMap::new();
        shards.insert(shard(index, 0), shard0);
        shards.insert(shard(index, 1), shard1);
        SnapshotEntry::new_snapshot(
            REPO,
            SnapshotId::new(name),
            vec![index.clone()],
            shards,
            false,
            false,
            now_ms(),
        )
    }

    fn sample_stats(processed: u64) -> ShardStats {
        ShardStats {
            start_time: 1_000,
            total_time_millis: 250,
            incremental_file_count: 3,
            total_file_count: 10,
            processed_file_count: processed,
            incremental_size: 1024,
            total_size: 8192,
            processed_size: processed * 512,
        }
    }

    fn live_reply(
        entry: &SnapshotEntry,
        index: &IndexId,
        shard_num: u32,
        stage: SnapshotStage,
        stats: ShardStats,
    ) -> Vec<NodeSnapshotStats> {
        vec![NodeSnapshotStats {
            snapshot: entry.snapshot.clone(),
            shards: vec![NodeShardStats {
                index: index.name.clone(),
                shard: shard_num,
                stage,
                stats,
                failure_reason: None,
            }],
        }]
    }

    // ============================================================
    // TEST 1: Stats tracker
    // ============================================================

    #[test]
    fn test_tracker_lifecycle() {
        let tracker = ShardStatsTracker::new();
        let snapshot = SnapshotId::new("s1");
        let shard = RepositoryShardId {
            index: IndexId::new("logs"),
            shard: 0,
        };

        tracker.start_shard(&snapshot, &shard, 10, 8192, 3, 1024);
        tracker.add_progress(&snapshot, &shard, 4, 2048);

        let groups = tracker.stats_for(std::slice::from_ref(&snapshot));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].shards.len(), 1);
        assert_eq!(groups[0].shards[0].stage, SnapshotStage::Started);
        assert_eq!(groups[0].shards[0].stats.processed_file_count, 4);
        assert_eq!(groups[0].shards[0].stats.processed_size, 2048);

        tracker.finish_shard(&snapshot, &shard);
        let groups = tracker.stats_for(std::slice::from_ref(&snapshot));
        assert_eq!(groups[0].shards[0].stage, SnapshotStage::Done);

        // Unrelated snapshots are not reported.
        let other = SnapshotId::new("other");
        assert!(tracker.stats_for(std::slice::from_ref(&other)).is_empty());

        tracker.clear_snapshot(&snapshot);
        assert_eq!(tracker.tracked_shard_count(), 0);
    }

    #[test]
    fn test_tracker_failure_records_reason() {
        let tracker = ShardStatsTracker::new();
        let snapshot = SnapshotId::new("s1");
        let shard = RepositoryShardId {
            index: IndexId::new("logs"),
            shard: 0,
        };

        tracker.start_shard(&snapshot, &shard, 10, 8192, 3, 1024);
        tracker.fail_shard(&snapshot, &shard, "disk full");

        let groups = tracker.stats_for(std::slice::from_ref(&snapshot));
        assert_eq!(groups[0].shards[0].stage, SnapshotStage::Failure);
        assert_eq!(
            groups[0].shards[0].failure_reason.as_deref(),
            Some("disk full")
        );
    }

    // ============================================================
    // TEST 2: Coarse-stage mapping
    // ============================================================

    #[test]
    fn test_stage_reconstruction_table() {
        assert_eq!(stage_for(ShardState::Failed), SnapshotStage::Failure);
        assert_eq!(stage_for(ShardState::Aborted), SnapshotStage::Failure);
        assert_eq!(stage_for(ShardState::Missing), SnapshotStage::Failure);
        assert_eq!(stage_for(ShardState::Init), SnapshotStage::Started);
        assert_eq!(stage_for(ShardState::Waiting), SnapshotStage::Started);
        assert_eq!(stage_for(ShardState::Queued), SnapshotStage::Started);
        assert_eq!(stage_for(ShardState::Started), SnapshotStage::Started);
        assert_eq!(stage_for(ShardState::Success), SnapshotStage::Done);
    }

    // ============================================================
    // TEST 3: Merging live and reconstructed shard status
    // ============================================================

    #[tokio::test]
    async fn test_live_and_reconstructed_shards_merge() {
        // Scenario: shard 0 succeeded on node A (exact stats persisted),
        // shard 1 runs on node B which is unreachable during the query.
        let repository = Arc::new(InMemoryRepository::new());
        let (state, _membership, service) = harness(repository.clone()).await;

        let node_a = NodeId::new();
        let node_b = NodeId::new();
        let index = IndexId::new("logs");
        let generation = ShardGeneration::new();
        let entry = two_shard_entry(
            "s1",
            &index,
            ShardSnapshotStatus::success(node_a.clone(), generation.clone()),
            ShardSnapshotStatus::started(node_b),
        );

        let persisted = sample_stats(10);
        repository.record_shard_result(
            REPO,
            &entry.snapshot,
            RepositoryShardId {
                index: index.clone(),
                shard: 0,
            },
            ShardSnapshotResult::done(generation, persisted.clone()),
        );

        state
            .install(Arc::new(SnapshotsInProgress::empty().with_entry(entry.clone())))
            .await;

        // ACT: no node replied at all
        let statuses = service
            .get_status(REPO, &["s1".to_string()], false)
            .await
            .unwrap();

        // ASSERT
        assert_eq!(statuses.len(), 1);
        let status = &statuses[0];
        assert_eq!(status.state, SnapshotState::Started);
        assert_eq!(status.shards.len(), 2);

        let done = status.shards.iter().find(|s| s.shard == 0).unwrap();
        assert_eq!(done.stage, SnapshotStage::Done);
        assert_eq!(done.stats, persisted);

        let reconstructed = status.shards.iter().find(|s| s.shard == 1).unwrap();
        assert_eq!(reconstructed.stage, SnapshotStage::Started);
        assert_eq!(reconstructed.stats, ShardStats::default());
    }

    #[tokio::test]
    async fn test_node_done_downgrades_to_finalize() {
        // The node says Done, the registry still says Started: the client
        // must see Finalize, never Done, until the coordinator catches up.
        let repository = Arc::new(InMemoryRepository::new());
        let (_state, _membership, service) = harness(repository).await;

        let node = NodeId::new();
        let index = IndexId::new("logs");
        let entry = two_shard_entry(
            "s1",
            &index,
            ShardSnapshotStatus::started(node.clone()),
            ShardSnapshotStatus::started(node.clone()),
        );

        let mut replies = HashMap::new();
        replies.insert(
            node,
            live_reply(&entry, &index, 0, SnapshotStage::Done, sample_stats(10)),
        );

        let status = service.live_status(&entry, &replies).await;

        let finalizing = status.shards.iter().find(|s| s.shard == 0).unwrap();
        assert_eq!(finalizing.stage, SnapshotStage::Finalize);
        // The live counters are still the node's exact ones.
        assert_eq!(finalizing.stats.processed_file_count, 10);

        let other = status.shards.iter().find(|s| s.shard == 1).unwrap();
        assert_eq!(other.stage, SnapshotStage::Started);
    }

    #[tokio::test]
    async fn test_done_with_registry_success_stays_done() {
        let repository = Arc::new(InMemoryRepository::new());
        let (_state, _membership, service) = harness(repository).await;

        let node = NodeId::new();
        let index = IndexId::new("logs");
        let entry = two_shard_entry(
            "s1",
            &index,
            ShardSnapshotStatus::success(node.clone(), ShardGeneration::new()),
            ShardSnapshotStatus::started(node.clone()),
        );

        let mut replies = HashMap::new();
        replies.insert(
            node,
            live_reply(&entry, &index, 0, SnapshotStage::Done, sample_stats(10)),
        );

        let status = service.live_status(&entry, &replies).await;

        assert_eq!(
            status.shards.iter().find(|s| s.shard == 0).unwrap().stage,
            SnapshotStage::Done
        );
    }

    // ============================================================
    // TEST 4: Historical fallback
    // ============================================================

    fn record_completed_snapshot(
        repository: &InMemoryRepository,
        name: &str,
    ) -> (SnapshotId, ShardStats) {
        let index = IndexId::new("logs");
        let repo_shard = RepositoryShardId {
            index: index.clone(),
            shard: 0,
        };
        let snapshot = SnapshotId::new(name);
        let stats = sample_stats(10);

        repository.record_snapshot(
            REPO,
            SnapshotInfo {
                snapshot: snapshot.clone(),
                state: SnapshotState::Success,
                start_time: 5_000,
                end_time: 7_500,
                include_global_state: true,
                indices: vec![index],
                shards: vec![repo_shard.clone()],
                failures: vec![],
            },
        );
        repository.record_shard_result(
            REPO,
            &snapshot,
            repo_shard,
            ShardSnapshotResult::done(ShardGeneration::new(), stats.clone()),
        );
        (snapshot, stats)
    }

    #[tokio::test]
    async fn test_historical_status_is_deterministic() {
        let repository = Arc::new(InMemoryRepository::new());
        let (_state, _membership, service) = harness(repository.clone()).await;
        let (_snapshot, stats) = record_completed_snapshot(&repository, "done-snap");

        let first = service
            .get_status(REPO, &["done-snap".to_string()], false)
            .await
            .unwrap();
        let second = service
            .get_status(REPO, &["done-snap".to_string()], false)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0].state, SnapshotState::Success);
        assert_eq!(first[0].duration_millis, 2_500);
        assert_eq!(first[0].shards[0].stage, SnapshotStage::Done);
        assert_eq!(first[0].shards[0].stats, stats);
    }

    #[tokio::test]
    async fn test_missing_snapshot_fails_query() {
        let repository = Arc::new(InMemoryRepository::new());
        let (_state, _membership, service) = harness(repository).await;

        let result = service
            .get_status(REPO, &["missing".to_string()], false)
            .await;

        match result {
            Err(StatusError::SnapshotMissing { name, .. }) => assert_eq!(name, "missing"),
            other => panic!("Expected SnapshotMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_ignore_unavailable_skips_missing_names() {
        let repository = Arc::new(InMemoryRepository::new());
        let (_state, _membership, service) = harness(repository.clone()).await;
        record_completed_snapshot(&repository, "kept");

        let statuses = service
            .get_status(
                REPO,
                &["missing".to_string(), "kept".to_string()],
                true,
            )
            .await
            .unwrap();

        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].snapshot.name, "kept");
    }

    #[tokio::test]
    async fn test_failed_snapshot_reports_skipped_shards() {
        // A failed non-partial snapshot wrote nothing; every shard must carry
        // the fixed "skipped" reason and no repository read is attempted
        // (there are no shard results to read, and the query still succeeds).
        let repository = Arc::new(InMemoryRepository::new());
        let (_state, _membership, service) = harness(repository.clone()).await;

        let index = IndexId::new("logs");
        let snapshot = SnapshotId::new("failed-snap");
        repository.record_snapshot(
            REPO,
            SnapshotInfo {
                snapshot: snapshot.clone(),
                state: SnapshotState::Failed,
                start_time: 5_000,
                end_time: 5_100,
                include_global_state: false,
                indices: vec![index.clone()],
                shards: vec![
                    RepositoryShardId {
                        index: index.clone(),
                        shard: 0,
                    },
                    RepositoryShardId {
                        index: index.clone(),
                        shard: 1,
                    },
                ],
                failures: vec![],
            },
        );

        let statuses = service
            .get_status(REPO, &["failed-snap".to_string()], false)
            .await
            .unwrap();

        assert_eq!(statuses[0].shards.len(), 2);
        for shard in &statuses[0].shards {
            assert_eq!(shard.stage, SnapshotStage::Failure);
            assert_eq!(shard.failure_reason.as_deref(), Some("skipped"));
        }
    }

    #[tokio::test]
    async fn test_recorded_shard_failure_is_surfaced() {
        let repository = Arc::new(InMemoryRepository::new());
        let (_state, _membership, service) = harness(repository.clone()).await;

        let index = IndexId::new("logs");
        let snapshot = SnapshotId::new("partial-snap");
        let good = RepositoryShardId {
            index: index.clone(),
            shard: 0,
        };
        let bad = RepositoryShardId {
            index: index.clone(),
            shard: 1,
        };

        repository.record_snapshot(
            REPO,
            SnapshotInfo {
                snapshot: snapshot.clone(),
                state: SnapshotState::Success,
                start_time: 5_000,
                end_time: 6_000,
                include_global_state: false,
                indices: vec![index.clone()],
                shards: vec![good.clone(), bad.clone()],
                failures: vec![ShardFailure {
                    shard: bad,
                    node: None,
                    reason: "read past EOF".to_string(),
                }],
            },
        );
        repository.record_shard_result(
            REPO,
            &snapshot,
            good,
            ShardSnapshotResult::done(ShardGeneration::new(), sample_stats(10)),
        );

        let statuses = service
            .get_status(REPO, &["partial-snap".to_string()], false)
            .await
            .unwrap();

        let shards = &statuses[0].shards;
        assert_eq!(shards.iter().find(|s| s.shard == 0).unwrap().stage, SnapshotStage::Done);
        let failed = shards.iter().find(|s| s.shard == 1).unwrap();
        assert_eq!(failed.stage, SnapshotStage::Failure);
        assert_eq!(failed.failure_reason.as_deref(), Some("read past EOF"));
    }

    // ============================================================
    // TEST 5: End-to-end fan-out against an in-process node
    // ============================================================

    #[tokio::test]
    async fn test_fan_out_collects_live_node_stats() {
        // ARRANGE: a worker "node" serving real stats over HTTP
        let tracker = Arc::new(ShardStatsTracker::new());
        let app = Router::new()
            .route(
                ENDPOINT_NODE_STATS,
                post(crate::status::handlers::handle_node_stats),
            )
            .layer(Extension(tracker.clone()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let worker_http = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let repository = Arc::new(InMemoryRepository::new());
        let (state, membership, service) = harness(repository).await;

        // Register the worker in the membership table.
        let worker = Node {
            id: NodeId::new(),
            gossip_addr: "127.0.0.1:1".parse().unwrap(),
            http_addr: worker_http,
            state: NodeState::Alive,
            incarnation: 1,
            last_seen: Some(Instant::now()),
        };
        membership.merge_member(worker.clone());

        // One snapshot with its only shard running on the worker.
        let index = IndexId::new("logs");
        let mut shards = BTreeMap::new();
        shards.insert(
            shard(&index, 0),
            ShardSnapshotStatus::started(worker.id.clone()),
        );
        let entry = SnapshotEntry::new_snapshot(
            REPO,
            SnapshotId::new("s1"),
            vec![index.clone()],
            shards,
            false,
            false,
            now_ms(),
        );
        tracker.start_shard(
            &entry.snapshot,
            &RepositoryShardId {
                index: index.clone(),
                shard: 0,
            },
            10,
            8192,
            3,
            1024,
        );
        tracker.add_progress(
            &entry.snapshot,
            &RepositoryShardId {
                index: index.clone(),
                shard: 0,
            },
            4,
            2048,
        );
        state
            .install(Arc::new(SnapshotsInProgress::empty().with_entry(entry)))
            .await;

        // ACT
        let statuses = service
            .get_status(REPO, &["s1".to_string()], false)
            .await
            .unwrap();

        // ASSERT: live counters made it through the fan-out
        assert_eq!(statuses.len(), 1);
        let shard_status = &statuses[0].shards[0];
        assert_eq!(shard_status.stage, SnapshotStage::Started);
        assert_eq!(shard_status.stats.processed_file_count, 4);
        assert_eq!(shard_status.stats.processed_size, 2048);
        assert_eq!(shard_status.stats.total_file_count, 10);
    }
}
