//! Snapshot Status Module
//!
//! The client-facing read path for snapshot progress.
//!
//! ## Overview
//! A status query is answered from three sources, in order of preference:
//! live per-shard counters fanned out from the nodes doing the work, coarse
//! reconstruction from the registry when a node cannot answer, and
//! repository-persisted metadata for operations no longer in the registry.
//! Precision degrades gracefully; the answer itself only fails when an
//! explicitly named snapshot cannot be resolved or read.
//!
//! ## Submodules
//! - **`types`**: stages, statistics, and the response value types.
//! - **`protocol`**: fan-out DTOs and endpoint constants.
//! - **`stats`**: the worker-side live progress tracker.
//! - **`aggregator`**: the merge itself (`StatusService`).
//! - **`handlers`**: HTTP request handlers for the Axum web server.

pub mod aggregator;
pub mod handlers;
pub mod protocol;
pub mod stats;
pub mod types;

#[cfg(test)]
mod tests;
