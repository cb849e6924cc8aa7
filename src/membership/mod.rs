//! Membership & Discovery Module
//!
//! Gossip-based membership (SWIM-like) over UDP. Every node keeps a local
//! table of cluster members with their gossip and HTTP addresses; the
//! snapshot status fan-out and the worker progress-report client resolve
//! node ids to addresses through this table.
//!
//! ## Core Mechanisms
//! - **Probing**: each node periodically pings one random peer; acks
//!   piggyback the full membership view.
//! - **Failure detection**: silence moves a member Alive -> Suspect -> Dead
//!   on configurable timeouts.
//! - **Incarnation numbers**: a node refutes a false suspicion by bumping
//!   its own incarnation, which outranks the stale claim everywhere.

pub mod service;
pub mod types;
