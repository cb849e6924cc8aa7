use super::protocol::*;
use super::state::ClusterState;
use crate::repository::reader::RepositoryReader;
use axum::{extract::Path, http::StatusCode, Extension, Json};
use std::sync::Arc;

pub async fn handle_create_snapshot(
    Extension(state): Extension<Arc<ClusterState>>,
    Path((repository, name)): Path<(String, String)>,
    Json(req): Json<CreateSnapshotRequest>,
) -> (StatusCode, Json<CreateSnapshotResponse>) {
    let indices: Vec<(String, u32)> = req
        .indices
        .iter()
        .map(|spec| (spec.name.clone(), spec.shards))
        .collect();

    match state
        .start_snapshot(
            &repository,
            &name,
            &indices,
            req.include_global_state,
            req.partial,
        )
        .await
    {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(CreateSnapshotResponse {
                snapshot: Some(snapshot),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to accept snapshot [{}]: {}", name, e);
            (
                StatusCode::CONFLICT,
                Json(CreateSnapshotResponse {
                    snapshot: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

/// Clone admission resolves the source's shard list from repository metadata
/// before the entry is built; the registry write itself stays I/O-free.
pub async fn handle_clone_snapshot(
    Extension(state): Extension<Arc<ClusterState>>,
    Extension(repository_reader): Extension<Arc<dyn RepositoryReader>>,
    Path((repository, name)): Path<(String, String)>,
    Json(req): Json<CloneSnapshotRequest>,
) -> (StatusCode, Json<CreateSnapshotResponse>) {
    let source = match repository_reader
        .resolve_snapshot(&repository, &req.source)
        .await
    {
        Ok(Some(source)) => source,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(CreateSnapshotResponse {
                    snapshot: None,
                    error: Some(format!("source snapshot [{}] is missing", req.source)),
                }),
            );
        }
        Err(e) => {
            tracing::error!("Failed to resolve clone source [{}]: {}", req.source, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CreateSnapshotResponse {
                    snapshot: None,
                    error: Some(e.to_string()),
                }),
            );
        }
    };

    let info = match repository_reader.snapshot_info(&repository, &source).await {
        Ok(info) => info,
        Err(e) => {
            tracing::error!("Failed to read clone source {}: {}", source, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CreateSnapshotResponse {
                    snapshot: None,
                    error: Some(e.to_string()),
                }),
            );
        }
    };

    match state
        .start_clone(&repository, &name, source, info.shards)
        .await
    {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(CreateSnapshotResponse {
                snapshot: Some(snapshot),
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::CONFLICT,
            Json(CreateSnapshotResponse {
                snapshot: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}

pub async fn handle_shard_progress(
    Extension(state): Extension<Arc<ClusterState>>,
    Json(req): Json<ShardProgressRequest>,
) -> (StatusCode, Json<ShardProgressResponse>) {
    let applied = state.apply_reports(&req.reports).await;

    tracing::debug!(
        "Applied {} shard report(s), registry changed: {}",
        req.reports.len(),
        applied
    );

    (StatusCode::OK, Json(ShardProgressResponse { applied }))
}

pub async fn handle_registry_dump(
    Extension(state): Extension<Arc<ClusterState>>,
) -> (StatusCode, Json<RegistryDumpResponse>) {
    let registry = state.current().await;

    (
        StatusCode::OK,
        Json(RegistryDumpResponse {
            registry: (*registry).clone(),
        }),
    )
}
