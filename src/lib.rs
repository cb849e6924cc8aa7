//! Distributed Snapshot Orchestration Library
//!
//! This library crate defines the core modules of the snapshot/clone
//! coordination layer for a sharded data store. It is the foundation for the
//! node binary (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of five loosely coupled subsystems:
//!
//! - **`membership`**: The cluster coordination layer. Uses a UDP-based Gossip
//!   protocol (SWIM-like) to manage node discovery, failure detection, and the
//!   node address book the status fan-out relies on.
//! - **`snapshots`**: The replicated state layer. Defines the immutable
//!   registry of in-progress snapshot and clone operations and the reducer
//!   that folds per-shard progress reports into it.
//! - **`status`**: The client-facing read path. Aggregates live per-shard
//!   statistics from worker nodes and reconstructs historical status from the
//!   repository when live data is gone.
//! - **`repository`**: The read-only contract into the blob repository
//!   (name resolution, snapshot metadata, persisted shard results) plus an
//!   in-memory implementation.
//! - **`coordinator`**: The single-writer lifecycle manager. Admits new
//!   operations, applies the reducer, and removes acknowledged entries.

pub mod coordinator;
pub mod membership;
pub mod repository;
pub mod snapshots;
pub mod status;
