//! Snapshot Registry Module
//!
//! The replicated state layer for snapshot/clone orchestration: pure data
//! plus a pure reducer, no I/O anywhere.
//!
//! ## Core Concepts
//! - **Registry**: `SnapshotsInProgress` is an ordered, immutable list of
//!   in-progress operations, held behind an `Arc` and replaced wholesale.
//!   Insertion order is submission order, which is the only ordering between
//!   operations.
//! - **Entries**: a tagged union of plain snapshots (live routing shards)
//!   and clones (repository-namespace shards). Operation state is always
//!   derived from the shard map.
//! - **Reducer**: folds worker progress reports into the registry, drops
//!   stale/duplicate reports as no-ops, and chains queued shards onto freed
//!   per-repository capacity in the same application.
//!
//! ## Submodules
//! - **`types`**: ids, shard states, per-shard status.
//! - **`entry`**: entries and the registry value.
//! - **`routing`**: the allocation view consulted when promoting shards.
//! - **`reducer`**: progress reports and the reduction/chaining pass.

pub mod entry;
pub mod reducer;
pub mod routing;
pub mod types;
