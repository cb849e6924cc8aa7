use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Instant;

/// Unique identifier for a node, stable for the life of the process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Liveness as seen by the local node. `Suspect` is an intermediate verdict
/// that the suspected node can refute with a higher incarnation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeState {
    Alive,
    Suspect,
    Dead,
}

/// One member of the cluster: identity, addressing, and liveness.
///
/// `gossip_addr` carries the UDP membership traffic; `http_addr` is where the
/// node serves its coordination API (status fan-out, progress reports).
/// `incarnation` is a logical clock owned by the node itself, bumped only to
/// refute a false suspicion; it orders conflicting liveness claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub gossip_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub state: NodeState,
    pub incarnation: u64,

    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

/// The UDP gossip wire protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipMessage {
    /// Liveness probe; the receiver answers with `Ack`.
    Ping { from: NodeId, incarnation: u64 },

    /// Probe answer, piggybacking the sender's full membership view so state
    /// spreads without a separate sync round.
    Ack {
        from: NodeId,
        incarnation: u64,
        members: Vec<Node>,
    },

    /// Sent by a starting node to its seeds.
    Join { node: Node },

    /// Disseminated when a member stops answering probes.
    Suspect { node_id: NodeId, incarnation: u64 },

    /// Dissemination that a member is (again) alive, including refutations.
    Alive { node_id: NodeId, incarnation: u64 },
}
