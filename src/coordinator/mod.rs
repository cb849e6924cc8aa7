//! Snapshot Coordination Module
//!
//! The single-writer lifecycle manager for the snapshot registry.
//!
//! ## Responsibilities
//! - **Admission**: accepting snapshot and clone requests, building their
//!   entries, and running the same chaining pass the reducer uses so new
//!   shards respect the per-repository concurrency budget from the start.
//! - **Reduction**: applying worker progress reports and allocation changes,
//!   one application at a time, publishing a new registry value only when
//!   something changed.
//! - **Acknowledgement**: removing terminal entries after their outcome has
//!   been persisted, at which point status queries fall through to the
//!   repository.
//! - **Reporting**: the worker-side client that delivers terminal shard
//!   reports to the coordinator with retries.

pub mod client;
pub mod handlers;
pub mod protocol;
pub mod state;
