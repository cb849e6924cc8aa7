use super::types::{
    IndexId, RepositoryShardId, ShardId, ShardSnapshotStatus, SnapshotId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Operation-level state. Always derived from the shard map via
/// [`SnapshotEntry::recompute_state`], never set independently.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SnapshotState {
    Started,
    Success,
    Failed,
}

impl SnapshotState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SnapshotState::Started)
    }
}

/// What kind of operation an entry tracks.
///
/// Plain snapshots copy live routing shards; clones copy persisted shard data
/// of another snapshot, keyed in the repository's namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum EntryKind {
    Snapshot {
        indices: Vec<IndexId>,
        #[serde(with = "serde_pairs")]
        shards: BTreeMap<ShardId, ShardSnapshotStatus>,
    },
    Clone {
        source: SnapshotId,
        #[serde(with = "serde_pairs")]
        clones: BTreeMap<RepositoryShardId, ShardSnapshotStatus>,
    },
}

/// Shard maps are keyed by composite ids, which JSON cannot use as object
/// keys; on the wire they travel as sequences of pairs instead.
mod serde_pairs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize + Ord,
        V: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let pairs: Vec<(K, V)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

/// One snapshot or clone operation tracked in the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub repository: String,
    pub snapshot: SnapshotId,
    pub state: SnapshotState,
    pub start_time: u64,
    pub include_global_state: bool,
    /// Whether shard failures still allow the operation to succeed.
    pub partial: bool,
    pub kind: EntryKind,
}

impl SnapshotEntry {
    pub fn new_snapshot(
        repository: &str,
        snapshot: SnapshotId,
        indices: Vec<IndexId>,
        shards: BTreeMap<ShardId, ShardSnapshotStatus>,
        include_global_state: bool,
        partial: bool,
        start_time: u64,
    ) -> Self {
        let mut entry = Self {
            repository: repository.to_string(),
            snapshot,
            state: SnapshotState::Started,
            start_time,
            include_global_state,
            partial,
            kind: EntryKind::Snapshot { indices, shards },
        };
        entry.recompute_state();
        entry
    }

    pub fn new_clone(
        repository: &str,
        snapshot: SnapshotId,
        source: SnapshotId,
        clones: BTreeMap<RepositoryShardId, ShardSnapshotStatus>,
        start_time: u64,
    ) -> Self {
        let mut entry = Self {
            repository: repository.to_string(),
            snapshot,
            state: SnapshotState::Started,
            start_time,
            include_global_state: false,
            // Clone sources are already persisted; a failed clone shard fails
            // the clone.
            partial: false,
            kind: EntryKind::Clone { source, clones },
        };
        entry.recompute_state();
        entry
    }

    pub fn is_clone(&self) -> bool {
        matches!(self.kind, EntryKind::Clone { .. })
    }

    /// Every shard of this entry under the repository-namespace key, which is
    /// the one key both kinds share.
    pub fn shard_view(&self) -> Vec<(RepositoryShardId, &ShardSnapshotStatus)> {
        match &self.kind {
            EntryKind::Snapshot { shards, .. } => shards
                .iter()
                .map(|(id, status)| (RepositoryShardId::from(id), status))
                .collect(),
            EntryKind::Clone { clones, .. } => clones
                .iter()
                .map(|(id, status)| (id.clone(), status))
                .collect(),
        }
    }

    pub fn snapshot_shard_mut(&mut self, shard: &ShardId) -> Option<&mut ShardSnapshotStatus> {
        match &mut self.kind {
            EntryKind::Snapshot { shards, .. } => shards.get_mut(shard),
            EntryKind::Clone { .. } => None,
        }
    }

    pub fn clone_shard_mut(
        &mut self,
        shard: &RepositoryShardId,
    ) -> Option<&mut ShardSnapshotStatus> {
        match &mut self.kind {
            EntryKind::Snapshot { .. } => None,
            EntryKind::Clone { clones, .. } => clones.get_mut(shard),
        }
    }

    /// Number of this entry's shards currently holding a concurrency slot.
    pub fn slots_in_use(&self) -> usize {
        self.shard_view()
            .iter()
            .filter(|(_, status)| status.state.consumes_slot())
            .count()
    }

    /// Re-derives the operation state from the shard map.
    ///
    /// Not all terminal: `Started`. All terminal without failures: `Success`.
    /// All terminal with at least one failure: `Failed`, unless the operation
    /// is `partial`, in which case the surviving shards make it a `Success`.
    pub fn recompute_state(&mut self) {
        let (all_terminal, any_failure) = {
            let shards = self.shard_view();
            (
                shards.iter().all(|(_, status)| status.is_terminal()),
                shards.iter().any(|(_, status)| status.is_failure()),
            )
        };

        self.state = if !all_terminal {
            SnapshotState::Started
        } else if any_failure && !self.partial {
            SnapshotState::Failed
        } else {
            SnapshotState::Success
        };
    }
}

/// The replicated registry of in-progress operations.
///
/// An ordered, immutable list of entries, one per cluster, replaced
/// atomically. Insertion order encodes submission order and is the sole
/// queue-ordering signal used when chaining queued shards onto freed
/// capacity. Readers hold an `Arc` to a consistent value; all mutation goes
/// through the reducer, which builds a whole new value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotsInProgress {
    entries: Vec<SnapshotEntry>,
}

impl SnapshotsInProgress {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, repository: &str, snapshot: &SnapshotId) -> Option<&SnapshotEntry> {
        self.entries
            .iter()
            .find(|entry| entry.repository == repository && &entry.snapshot == snapshot)
    }

    pub fn find_by_name(&self, repository: &str, name: &str) -> Option<&SnapshotEntry> {
        self.entries
            .iter()
            .find(|entry| entry.repository == repository && entry.snapshot.name == name)
    }

    pub fn for_repository<'a>(
        &'a self,
        repository: &'a str,
    ) -> impl Iterator<Item = &'a SnapshotEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.repository == repository)
    }

    /// Concurrency slots currently held against `repository` across all
    /// entries, in submission order semantics (the order itself does not
    /// matter for the count, only for who gets freed capacity).
    pub fn slots_in_use(&self, repository: &str) -> usize {
        self.for_repository(repository)
            .map(|entry| entry.slots_in_use())
            .sum()
    }

    /// A new registry value with `entry` appended.
    pub fn with_entry(&self, entry: SnapshotEntry) -> Self {
        let mut entries = self.entries.clone();
        entries.push(entry);
        Self { entries }
    }

    /// A new registry value without the named entry.
    pub fn without_entry(&self, repository: &str, snapshot: &SnapshotId) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|entry| {
                    !(entry.repository == repository && &entry.snapshot == snapshot)
                })
                .cloned()
                .collect(),
        }
    }

    /// Mutable access for the reducer while it assembles the next value.
    pub(crate) fn entries_mut(&mut self) -> &mut Vec<SnapshotEntry> {
        &mut self.entries
    }
}
