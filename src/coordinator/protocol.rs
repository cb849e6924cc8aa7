//! Coordination Protocol Definitions
//!
//! DTOs and endpoint constants for the coordinator's HTTP surface: operation
//! admission, worker progress reports, acknowledgement, and the registry
//! dump used for debugging.

use crate::snapshots::entry::SnapshotsInProgress;
use crate::snapshots::reducer::ShardProgressReport;
use crate::snapshots::types::SnapshotId;
use serde::{Deserialize, Serialize};

pub const ENDPOINT_SHARD_PROGRESS: &str = "/internal/shard_progress";
pub const ENDPOINT_REGISTRY_DUMP: &str = "/internal/snapshots_in_progress";

/// One index to include in a plain snapshot.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub shards: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSnapshotRequest {
    pub indices: Vec<IndexSpec>,
    #[serde(default)]
    pub include_global_state: bool,
    #[serde(default)]
    pub partial: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CloneSnapshotRequest {
    /// Name of the already-persisted source snapshot.
    pub source: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSnapshotResponse {
    pub snapshot: Option<SnapshotId>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShardProgressRequest {
    pub reports: Vec<ShardProgressReport>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShardProgressResponse {
    /// Whether the batch changed the registry. Stale and duplicate reports
    /// are absorbed, so `false` is a normal answer, not an error.
    pub applied: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub acknowledged: bool,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegistryDumpResponse {
    pub registry: SnapshotsInProgress,
}
