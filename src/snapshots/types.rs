use crate::membership::types::NodeId;
use serde::{Deserialize, Serialize};

/// Identifies one snapshot operation.
///
/// The `name` is what clients address; the `uuid` disambiguates re-used names
/// (a deleted snapshot's name may be taken again by a later operation).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotId {
    pub name: String,
    pub uuid: String,
}

impl SnapshotId {
    /// Mints a fresh id for a newly accepted operation.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            uuid: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.uuid)
    }
}

/// Identifies an index independently of its name (names can be re-created).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexId {
    pub name: String,
    pub uuid: String,
}

impl IndexId {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            uuid: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// A live routing shard: one numbered shard of an index, as allocated in the
/// cluster right now. Plain snapshots copy data from these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardId {
    pub index: IndexId,
    pub shard: u32,
}

/// A shard addressed in the repository's own namespace.
///
/// Clones copy already-persisted shard data, so they are keyed by this rather
/// than by a routing shard. The source index does not need to be open, or even
/// exist in the cluster anymore.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryShardId {
    pub index: IndexId,
    pub shard: u32,
}

impl From<&ShardId> for RepositoryShardId {
    fn from(shard: &ShardId) -> Self {
        Self {
            index: shard.index.clone(),
            shard: shard.shard,
        }
    }
}

/// Opaque repository-assigned token identifying a persisted shard-snapshot
/// artifact. Assigned when a shard reaches `Success`; required later to find
/// the persisted data again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ShardGeneration(pub String);

impl ShardGeneration {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ShardGeneration {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-shard lifecycle state inside the registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ShardState {
    /// Assigned to a node, snapshotting has not begun.
    Init,
    /// The routing shard is mid-recovery; the slot is held until it settles.
    Waiting,
    /// Waiting for repository capacity to free up.
    Queued,
    /// The owning node is copying shard data.
    Started,
    /// Shard data is persisted; the status carries the generation.
    Success,
    /// The owning node reported a failure.
    Failed,
    /// The operation was aborted before this shard completed.
    Aborted,
    /// The shard could not be snapshotted at all (e.g. unassigned).
    Missing,
}

impl ShardState {
    /// Terminal states never change again for this operation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ShardState::Success | ShardState::Failed | ShardState::Aborted | ShardState::Missing
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ShardState::Failed | ShardState::Aborted | ShardState::Missing
        )
    }

    /// Whether the shard occupies one unit of the per-repository concurrency
    /// budget. Queued shards are exactly the ones that do not.
    pub fn consumes_slot(&self) -> bool {
        matches!(
            self,
            ShardState::Init | ShardState::Waiting | ShardState::Started
        )
    }
}

/// A single shard's progress, carried both inside the registry and across the
/// wire in progress reports.
///
/// Invariants (upheld by the constructors below):
/// - `generation` is present iff `state == Success`.
/// - `failure_reason` is present iff `state` is a failure variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardSnapshotStatus {
    /// Worker currently (or last) responsible; absent while unassigned.
    pub node: Option<NodeId>,
    pub state: ShardState,
    pub generation: Option<ShardGeneration>,
    pub failure_reason: Option<String>,
}

impl ShardSnapshotStatus {
    /// A shard parked behind the repository's concurrency budget.
    pub fn queued() -> Self {
        Self {
            node: None,
            state: ShardState::Queued,
            generation: None,
            failure_reason: None,
        }
    }

    /// A shard assigned to `node`, not yet copying data.
    pub fn init(node: NodeId) -> Self {
        Self {
            node: Some(node),
            state: ShardState::Init,
            generation: None,
            failure_reason: None,
        }
    }

    /// A shard whose routing shard is still recovering on `node`.
    pub fn waiting(node: NodeId) -> Self {
        Self {
            node: Some(node),
            state: ShardState::Waiting,
            generation: None,
            failure_reason: None,
        }
    }

    /// A shard actively being copied by `node`.
    pub fn started(node: NodeId) -> Self {
        Self {
            node: Some(node),
            state: ShardState::Started,
            generation: None,
            failure_reason: None,
        }
    }

    pub fn success(node: NodeId, generation: ShardGeneration) -> Self {
        Self {
            node: Some(node),
            state: ShardState::Success,
            generation: Some(generation),
            failure_reason: None,
        }
    }

    pub fn failed(node: Option<NodeId>, reason: &str) -> Self {
        Self {
            node,
            state: ShardState::Failed,
            generation: None,
            failure_reason: Some(reason.to_string()),
        }
    }

    pub fn aborted(node: Option<NodeId>, reason: &str) -> Self {
        Self {
            node,
            state: ShardState::Aborted,
            generation: None,
            failure_reason: Some(reason.to_string()),
        }
    }

    /// A shard that cannot be snapshotted: no node, terminal immediately.
    pub fn missing(reason: &str) -> Self {
        Self {
            node: None,
            state: ShardState::Missing,
            generation: None,
            failure_reason: Some(reason.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_failure(&self) -> bool {
        self.state.is_failure()
    }
}

/// Helper to get the current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}
