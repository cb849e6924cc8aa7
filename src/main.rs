use axum::extract::Path;
use axum::http::StatusCode;
use axum::{
    extract::Extension,
    routing::{get, post},
    Json, Router,
};
use snapshot_cluster::coordinator::handlers::{
    handle_clone_snapshot, handle_create_snapshot, handle_registry_dump, handle_shard_progress,
};
use snapshot_cluster::coordinator::protocol::{
    AckResponse, ENDPOINT_REGISTRY_DUMP, ENDPOINT_SHARD_PROGRESS,
};
use snapshot_cluster::coordinator::state::{ClusterState, SnapshotClusterConfig};
use snapshot_cluster::membership::service::{MembershipConfig, MembershipService};
use snapshot_cluster::repository::memory::InMemoryRepository;
use snapshot_cluster::repository::reader::RepositoryReader;
use snapshot_cluster::repository::types::{ShardFailure, ShardSnapshotResult, SnapshotInfo};
use snapshot_cluster::snapshots::entry::{EntryKind, SnapshotEntry};
use snapshot_cluster::snapshots::routing::RoutingTable;
use snapshot_cluster::snapshots::types::{now_ms, ShardState};
use snapshot_cluster::status::aggregator::StatusService;
use snapshot_cluster::status::handlers::{handle_node_stats, handle_snapshot_status};
use snapshot_cluster::status::protocol::ENDPOINT_NODE_STATS;
use snapshot_cluster::status::stats::ShardStatsTracker;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --bind <addr:port> [--seed <addr:port>] [--shard-budget <n>]",
            args[0]
        );
        eprintln!("Example: {} --bind 127.0.0.1:5000", args[0]);
        eprintln!(
            "Example: {} --bind 127.0.0.1:5001 --seed 127.0.0.1:5000",
            args[0]
        );
        std::process::exit(1);
    }

    let mut bind_addr: Option<SocketAddr> = None;
    let mut seed_nodes: Vec<SocketAddr> = vec![];
    let mut config = SnapshotClusterConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                bind_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--seed" => {
                seed_nodes.push(args[i + 1].parse()?);
                i += 2;
            }
            "--shard-budget" => {
                config.max_concurrent_shard_snapshots = args[i + 1].parse()?;
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let bind_addr = bind_addr.expect("--bind is required");
    let http_addr = SocketAddr::new(bind_addr.ip(), bind_addr.port() + 1000);

    tracing::info!("Starting node on {} (http on {})", bind_addr, http_addr);
    if seed_nodes.is_empty() {
        tracing::info!("Starting as seed node (founder)");
    } else {
        tracing::info!("Seed nodes: {:?}", seed_nodes);
    }

    // 1. Membership (UDP gossip):
    let membership =
        MembershipService::new(bind_addr, http_addr, seed_nodes, MembershipConfig::default())
            .await?;
    tracing::info!("Node ID: {:?}", membership.local_node.id);

    // 2. Snapshot coordination state:
    let state = ClusterState::new(
        RoutingTable::new(membership.local_node.id.clone()),
        config,
    );

    // 3. Repository + worker stats + status read path:
    let repository = Arc::new(InMemoryRepository::new());
    let repository_reader: Arc<dyn RepositoryReader> = repository.clone();
    let tracker = Arc::new(ShardStatsTracker::new());
    let status_service =
        StatusService::new(state.clone(), membership.clone(), repository_reader.clone());

    // 4. HTTP Router:
    let app = Router::new()
        .route("/snapshots/:repository/:name", post(handle_create_snapshot))
        .route(
            "/snapshots/:repository/:name/clone",
            post(handle_clone_snapshot),
        )
        .route(
            "/snapshots/:repository/:name/ack",
            post(handle_acknowledge),
        )
        .route("/status/:repository", get(handle_snapshot_status))
        .route(ENDPOINT_SHARD_PROGRESS, post(handle_shard_progress))
        .route(ENDPOINT_NODE_STATS, post(handle_node_stats))
        .route(ENDPOINT_REGISTRY_DUMP, get(handle_registry_dump))
        .layer(Extension(state.clone()))
        .layer(Extension(status_service))
        .layer(Extension(tracker))
        .layer(Extension(repository))
        .layer(Extension(repository_reader));

    // 5. Spawn membership service:
    let service_clone = membership.clone();
    tokio::spawn(async move {
        service_clone.start().await;
    });

    // 6. Spawn stats reporter:
    let stats_membership = membership.clone();
    let stats_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(10));

        loop {
            interval.tick().await;
            let alive = stats_membership.get_alive_members();
            let registry = stats_state.current().await;
            tracing::info!(
                "Cluster stats: {} alive node(s), {} snapshot(s) in progress",
                alive.len(),
                registry.len()
            );
            for entry in registry.entries() {
                tracing::info!(
                    "  - {} {} [{}] {:?} ({} shard(s))",
                    if entry.is_clone() { "clone" } else { "snapshot" },
                    entry.snapshot,
                    entry.repository,
                    entry.state,
                    entry.shard_view().len()
                );
            }
        }
    });

    // 7. Start HTTP server:
    tracing::info!("HTTP server listening on {}", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Acknowledgement glue: persist the terminal entry's outcome into the
/// repository first, then drop it from the registry. From that point on the
/// snapshot's status is served by the historical fallback path.
async fn handle_acknowledge(
    Extension(state): Extension<Arc<ClusterState>>,
    Extension(repository): Extension<Arc<InMemoryRepository>>,
    Extension(tracker): Extension<Arc<ShardStatsTracker>>,
    Path((repo_name, name)): Path<(String, String)>,
) -> (StatusCode, Json<AckResponse>) {
    let registry = state.current().await;
    let Some(entry) = registry.find_by_name(&repo_name, &name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(AckResponse {
                acknowledged: false,
                error: Some(format!("snapshot [{}] is not in progress", name)),
            }),
        );
    };
    if !entry.state.is_terminal() {
        return (
            StatusCode::CONFLICT,
            Json(AckResponse {
                acknowledged: false,
                error: Some(format!("snapshot [{}] has not finished yet", name)),
            }),
        );
    }

    persist_outcome(&repository, &tracker, entry);

    match state.acknowledge(&repo_name, &name).await {
        Ok(removed) => {
            tracker.clear_snapshot(&removed.snapshot);
            (
                StatusCode::OK,
                Json(AckResponse {
                    acknowledged: true,
                    error: None,
                }),
            )
        }
        Err(e) => {
            // Already acknowledged concurrently; the repository write above
            // is idempotent.
            tracing::warn!("Acknowledgement raced for [{}]: {}", name, e);
            (
                StatusCode::CONFLICT,
                Json(AckResponse {
                    acknowledged: false,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

/// Writes a terminal entry's metadata and per-shard outcomes into the
/// repository, using exact tracker stats where this node executed the shard.
fn persist_outcome(
    repository: &InMemoryRepository,
    tracker: &ShardStatsTracker,
    entry: &SnapshotEntry,
) {
    let tracked = tracker.stats_for(std::slice::from_ref(&entry.snapshot));

    let mut shards = Vec::new();
    let mut failures = Vec::new();
    for (repo_shard, status) in entry.shard_view() {
        shards.push(repo_shard.clone());

        if status.is_failure() {
            failures.push(ShardFailure {
                shard: repo_shard.clone(),
                node: status.node.clone(),
                reason: status
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            });
            continue;
        }

        if status.state == ShardState::Success {
            if let Some(generation) = &status.generation {
                let stats = tracked
                    .iter()
                    .flat_map(|group| group.shards.iter())
                    .find(|shard| {
                        shard.index == repo_shard.index.name && shard.shard == repo_shard.shard
                    })
                    .map(|shard| shard.stats.clone())
                    .unwrap_or_default();

                repository.record_shard_result(
                    &entry.repository,
                    &entry.snapshot,
                    repo_shard.clone(),
                    ShardSnapshotResult::done(generation.clone(), stats),
                );
            }
        }
    }

    let indices = match &entry.kind {
        EntryKind::Snapshot { indices, .. } => indices.clone(),
        EntryKind::Clone { clones, .. } => {
            let mut indices = Vec::new();
            for shard in clones.keys() {
                if !indices.contains(&shard.index) {
                    indices.push(shard.index.clone());
                }
            }
            indices
        }
    };

    repository.record_snapshot(
        &entry.repository,
        SnapshotInfo {
            snapshot: entry.snapshot.clone(),
            state: entry.state,
            start_time: entry.start_time,
            end_time: now_ms(),
            include_global_state: entry.include_global_state,
            indices,
            shards,
            failures,
        },
    );

    tracing::info!(
        "Persisted outcome of {} [{}] to the repository",
        entry.snapshot,
        entry.repository
    );
}
