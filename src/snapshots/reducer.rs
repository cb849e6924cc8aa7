//! Shard-State Reducer
//!
//! The single mutation path for the snapshot registry. Given the current
//! registry value and a batch of terminal per-shard progress reports, it
//! computes the next registry value and whether anything actually changed.
//!
//! ## Guarantees
//! - **Purity**: no I/O, no locks; callers serialize invocations (one reducer
//!   application in flight cluster-wide) and publish the returned value.
//! - **No-op detection**: stale, duplicated, or unknown reports are absorbed
//!   silently. If the whole batch is a no-op the *same* `Arc` is returned, so
//!   the replication layer can skip publishing on pointer equality.
//! - **Chaining**: capacity freed by a completed shard is handed to queued
//!   shards in submission order within the same application, as a single
//!   pass over all entries rather than recursive event emission.

use super::entry::{EntryKind, SnapshotsInProgress};
use super::routing::{RoutingTable, ShardRouting};
use super::types::{
    RepositoryShardId, ShardGeneration, ShardId, ShardSnapshotStatus, ShardState, SnapshotId,
};
use crate::membership::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// The shard a progress report is about.
///
/// Plain snapshots address live routing shards; clones address shards in the
/// repository's namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReportedShard {
    Routing(ShardId),
    Repository(RepositoryShardId),
}

/// A worker's terminal verdict for one shard of one operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardProgressReport {
    pub repository: String,
    pub snapshot: SnapshotId,
    pub shard: ReportedShard,
    /// The reporting node. Must match the recorded shard owner.
    pub node: NodeId,
    /// Terminal state only; non-terminal reports are dropped.
    pub state: ShardState,
    pub generation: Option<ShardGeneration>,
    pub failure_reason: Option<String>,
}

impl ShardProgressReport {
    pub fn success(
        repository: &str,
        snapshot: SnapshotId,
        shard: ReportedShard,
        node: NodeId,
        generation: ShardGeneration,
    ) -> Self {
        Self {
            repository: repository.to_string(),
            snapshot,
            shard,
            node,
            state: ShardState::Success,
            generation: Some(generation),
            failure_reason: None,
        }
    }

    pub fn failed(
        repository: &str,
        snapshot: SnapshotId,
        shard: ReportedShard,
        node: NodeId,
        reason: &str,
    ) -> Self {
        Self {
            repository: repository.to_string(),
            snapshot,
            shard,
            node,
            state: ShardState::Failed,
            generation: None,
            failure_reason: Some(reason.to_string()),
        }
    }

    /// Validates the report and builds the status to record.
    ///
    /// `None` means the report is malformed (non-terminal state, success
    /// without a generation, failure without a reason) and must be ignored.
    fn to_status(&self) -> Option<ShardSnapshotStatus> {
        match self.state {
            ShardState::Success => self.generation.clone().map(|generation| {
                ShardSnapshotStatus::success(self.node.clone(), generation)
            }),
            ShardState::Failed | ShardState::Aborted | ShardState::Missing => {
                let reason = self.failure_reason.as_deref()?;
                Some(match self.state {
                    ShardState::Failed => {
                        ShardSnapshotStatus::failed(Some(self.node.clone()), reason)
                    }
                    ShardState::Aborted => {
                        ShardSnapshotStatus::aborted(Some(self.node.clone()), reason)
                    }
                    _ => ShardSnapshotStatus::missing(reason),
                })
            }
            _ => None,
        }
    }
}

/// Applies a batch of progress reports to the registry.
///
/// Returns the next registry value and `changed`. When `changed` is false the
/// returned `Arc` is the input `Arc` itself.
pub fn apply_shard_reports(
    current: &Arc<SnapshotsInProgress>,
    reports: &[ShardProgressReport],
    routing: &RoutingTable,
    max_slots: usize,
) -> (Arc<SnapshotsInProgress>, bool) {
    let mut next = (**current).clone();
    let mut changed = false;

    for report in reports {
        changed |= apply_one(&mut next, report);
    }

    if !changed {
        return (Arc::clone(current), false);
    }

    promote_queued_shards(&mut next, routing, max_slots);
    (Arc::new(next), true)
}

/// Folds allocation changes into the registry: shards waiting on recovery
/// start once their routing shard settles, shards whose routing shard
/// vanished fail, and freed capacity chains to queued shards as usual.
pub fn apply_routing_change(
    current: &Arc<SnapshotsInProgress>,
    routing: &RoutingTable,
    max_slots: usize,
) -> (Arc<SnapshotsInProgress>, bool) {
    let mut next = (**current).clone();
    let mut changed = false;

    for entry in next.entries_mut() {
        let EntryKind::Snapshot { shards, .. } = &mut entry.kind else {
            continue;
        };

        let mut touched = false;
        for (shard_id, status) in shards.iter_mut() {
            match status.state {
                ShardState::Waiting => match routing.routing_of(shard_id) {
                    ShardRouting::Started(node) => {
                        tracing::debug!(
                            "Shard {:?} recovered on {:?}, starting snapshot",
                            shard_id,
                            node
                        );
                        *status = ShardSnapshotStatus::init(node);
                        touched = true;
                    }
                    ShardRouting::Unassigned => {
                        *status = ShardSnapshotStatus::missing("shard is unassigned");
                        touched = true;
                    }
                    _ => {}
                },
                ShardState::Init => {
                    if routing.routing_of(shard_id) == ShardRouting::Unassigned {
                        *status = ShardSnapshotStatus::missing("shard is unassigned");
                        touched = true;
                    }
                }
                _ => {}
            }
        }

        if touched {
            entry.recompute_state();
            changed = true;
        }
    }

    let promoted = promote_queued_shards(&mut next, routing, max_slots);

    if changed || promoted {
        (Arc::new(next), true)
    } else {
        (Arc::clone(current), false)
    }
}

fn apply_one(next: &mut SnapshotsInProgress, report: &ShardProgressReport) -> bool {
    let Some(entry) = next.entries_mut().iter_mut().find(|entry| {
        entry.repository == report.repository && entry.snapshot == report.snapshot
    }) else {
        // Entry already removed; a late report from a slow worker.
        tracing::debug!(
            "Dropping report for unknown snapshot {} in [{}]",
            report.snapshot,
            report.repository
        );
        return false;
    };

    let Some(recorded) = (match &report.shard {
        ReportedShard::Routing(shard) => entry.snapshot_shard_mut(shard),
        ReportedShard::Repository(shard) => entry.clone_shard_mut(shard),
    }) else {
        tracing::debug!(
            "Dropping report for unknown shard {:?} of snapshot {}",
            report.shard,
            report.snapshot
        );
        return false;
    };

    // Only shards handed to a node can complete. Queued and terminal shards
    // reject reports outright, which makes duplicated deliveries harmless.
    if !matches!(
        recorded.state,
        ShardState::Init | ShardState::Waiting | ShardState::Started
    ) {
        tracing::debug!(
            "Dropping report for shard {:?} in state {:?}",
            report.shard,
            recorded.state
        );
        return false;
    }

    // Stale-owner check: a node that lost the shard (e.g. after relocation)
    // may still report; only the recorded owner's verdict counts.
    if recorded.node.as_ref() != Some(&report.node) {
        tracing::debug!(
            "Dropping report from {:?} for shard {:?} owned by {:?}",
            report.node,
            report.shard,
            recorded.node
        );
        return false;
    }

    let Some(status) = report.to_status() else {
        tracing::warn!(
            "Dropping malformed report for shard {:?} (state {:?})",
            report.shard,
            report.state
        );
        return false;
    };

    tracing::debug!(
        "Shard {:?} of snapshot {} -> {:?}",
        report.shard,
        report.snapshot,
        status.state
    );
    *recorded = status;
    entry.recompute_state();
    true
}

/// The chaining pass: hands freed repository capacity to queued shards.
///
/// Entries are scanned in submission order, so a completed shard of an
/// earlier plain snapshot can start a queued clone shard and vice versa;
/// operations are not otherwise ordered relative to each other. Runs as one
/// deterministic pass, never recursively.
pub(crate) fn promote_queued_shards(
    next: &mut SnapshotsInProgress,
    routing: &RoutingTable,
    max_slots: usize,
) -> bool {
    let mut slots: HashMap<String, usize> = HashMap::new();
    for entry in next.entries() {
        *slots.entry(entry.repository.clone()).or_insert(0) += entry.slots_in_use();
    }

    let mut promoted = false;

    for entry in next.entries_mut() {
        let used = slots.entry(entry.repository.clone()).or_insert(0);
        let mut touched = false;

        match &mut entry.kind {
            EntryKind::Snapshot { shards, .. } => {
                for (shard_id, status) in shards.iter_mut() {
                    if status.state != ShardState::Queued {
                        continue;
                    }
                    if *used >= max_slots {
                        break;
                    }
                    match routing.routing_of(shard_id) {
                        ShardRouting::Started(node) => {
                            *status = ShardSnapshotStatus::init(node);
                            *used += 1;
                            touched = true;
                        }
                        ShardRouting::Initializing(node) => {
                            // Mid-recovery: hold the slot, start after
                            // recovery completes.
                            *status = ShardSnapshotStatus::waiting(node);
                            *used += 1;
                            touched = true;
                        }
                        ShardRouting::Relocating(_) => {
                            // Not eligible until the move settles.
                        }
                        ShardRouting::Unassigned => {
                            // Cannot snapshot an unassigned shard; terminal
                            // immediately and the slot stays free.
                            *status =
                                ShardSnapshotStatus::missing("shard is unassigned");
                            touched = true;
                        }
                    }
                }
            }
            EntryKind::Clone { clones, .. } => {
                for status in clones.values_mut() {
                    if status.state != ShardState::Queued {
                        continue;
                    }
                    if *used >= max_slots {
                        break;
                    }
                    *status = ShardSnapshotStatus::started(routing.local().clone());
                    *used += 1;
                    touched = true;
                }
            }
        }

        if touched {
            entry.recompute_state();
            promoted = true;
        }
    }

    promoted
}
