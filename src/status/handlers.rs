use super::aggregator::{StatusError, StatusService};
use super::protocol::{NodeStatsRequest, NodeStatsResponse, StatusQueryResponse};
use super::stats::ShardStatsTracker;
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct StatusQueryParams {
    /// Comma-separated snapshot names; absent or empty means all in-progress.
    pub snapshots: Option<String>,
    #[serde(default)]
    pub ignore_unavailable: bool,
}

pub async fn handle_snapshot_status(
    Extension(service): Extension<Arc<StatusService>>,
    Path(repository): Path<String>,
    Query(params): Query<StatusQueryParams>,
) -> (StatusCode, Json<StatusQueryResponse>) {
    let names: Vec<String> = params
        .snapshots
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    match service
        .get_status(&repository, &names, params.ignore_unavailable)
        .await
    {
        Ok(snapshots) => (
            StatusCode::OK,
            Json(StatusQueryResponse {
                snapshots,
                error: None,
            }),
        ),
        Err(e @ StatusError::SnapshotMissing { .. }) => (
            StatusCode::NOT_FOUND,
            Json(StatusQueryResponse {
                snapshots: vec![],
                error: Some(e.to_string()),
            }),
        ),
        Err(e) => {
            tracing::error!("Status query failed for [{}]: {}", repository, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusQueryResponse {
                    snapshots: vec![],
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

/// Fan-out target: live stats for the requested snapshots as this node sees
/// them.
pub async fn handle_node_stats(
    Extension(tracker): Extension<Arc<ShardStatsTracker>>,
    Json(req): Json<NodeStatsRequest>,
) -> (StatusCode, Json<NodeStatsResponse>) {
    let snapshots = tracker.stats_for(&req.snapshots);

    tracing::debug!(
        "Answering node stats for {} snapshot(s), {} tracked locally",
        req.snapshots.len(),
        snapshots.len()
    );

    (StatusCode::OK, Json(NodeStatsResponse { snapshots }))
}
