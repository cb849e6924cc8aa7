use super::types::{GossipMessage, Node, NodeId, NodeState};
use anyhow::Result;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;

/// Tunables for the gossip protocol. Defaults are sized for LAN clusters.
#[derive(Debug, Clone)]
pub struct MembershipConfig {
    /// How often the local node probes one random peer.
    pub probe_interval: Duration,
    /// Silence before an Alive member becomes Suspect.
    pub suspect_after: Duration,
    /// Silence before a Suspect member is declared Dead.
    pub dead_after: Duration,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_millis(500),
            suspect_after: Duration::from_secs(5),
            dead_after: Duration::from_secs(10),
        }
    }
}

/// Gossip-based cluster membership.
///
/// Keeps the address book (`NodeId` -> gossip/HTTP address) the snapshot
/// status fan-out and the progress-report client rely on, and a liveness
/// verdict per member. All background work runs in tasks spawned by
/// [`start`](Self::start).
pub struct MembershipService {
    pub local_node: Node,
    pub members: Arc<DashMap<NodeId, Node>>,
    socket: Arc<UdpSocket>,
    incarnation: Arc<RwLock<u64>>,
    config: MembershipConfig,
}

impl MembershipService {
    /// Binds the gossip socket and, when seeds are given, announces itself to
    /// them. `http_addr` is advertised to peers as-is.
    pub async fn new(
        gossip_addr: SocketAddr,
        http_addr: SocketAddr,
        seed_nodes: Vec<SocketAddr>,
        config: MembershipConfig,
    ) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(gossip_addr).await?;

        let local_node = Node {
            id: NodeId::new(),
            gossip_addr: socket.local_addr()?,
            http_addr,
            state: NodeState::Alive,
            incarnation: 1,
            last_seen: Some(Instant::now()),
        };

        let members = Arc::new(DashMap::new());
        members.insert(local_node.id.clone(), local_node.clone());

        if !seed_nodes.is_empty() {
            tracing::info!("Joining cluster via {} seed node(s)", seed_nodes.len());
            let join = GossipMessage::Join {
                node: local_node.clone(),
            };
            let encoded = bincode::serialize(&join)?;
            for seed in &seed_nodes {
                socket.send_to(&encoded, seed).await?;
                tracing::info!("Sent join request to {}", seed);
            }
        }

        Ok(Arc::new(Self {
            local_node,
            members,
            socket: Arc::new(socket),
            incarnation: Arc::new(RwLock::new(1)),
            config,
        }))
    }

    /// Spawns the probe, receive, and failure-detection loops.
    pub async fn start(self: Arc<Self>) {
        tracing::info!("Starting membership service");

        let probe = self.clone();
        tokio::spawn(async move {
            probe.probe_loop().await;
        });

        let receive = self.clone();
        tokio::spawn(async move {
            receive.receive_loop().await;
        });

        let detect = self.clone();
        tokio::spawn(async move {
            detect.failure_detection_loop().await;
        });
    }

    pub fn get_member(&self, node_id: &NodeId) -> Option<Node> {
        self.members.get(node_id).map(|entry| entry.value().clone())
    }

    /// HTTP address for a member, dead or alive. Status fan-out still tries a
    /// Suspect node; a timeout there degrades precision, not correctness.
    pub fn http_addr_of(&self, node_id: &NodeId) -> Option<SocketAddr> {
        self.get_member(node_id).map(|node| node.http_addr)
    }

    pub fn get_alive_members(&self) -> Vec<Node> {
        self.members
            .iter()
            .filter(|entry| entry.value().state == NodeState::Alive)
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn probe_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.probe_interval);

        loop {
            interval.tick().await;

            let peers: Vec<Node> = self
                .members
                .iter()
                .filter(|entry| {
                    entry.value().id != self.local_node.id
                        && entry.value().state == NodeState::Alive
                })
                .map(|entry| entry.value().clone())
                .collect();

            if peers.is_empty() {
                continue;
            }

            use rand::Rng;
            let target = &peers[rand::thread_rng().gen_range(0..peers.len())];
            let incarnation = *self.incarnation.read().await;
            let ping = GossipMessage::Ping {
                from: self.local_node.id.clone(),
                incarnation,
            };

            match bincode::serialize(&ping) {
                Ok(encoded) => {
                    if let Err(e) = self.socket.send_to(&encoded, target.gossip_addr).await {
                        tracing::warn!("Failed to ping {:?}: {}", target.id, e);
                    }
                }
                Err(e) => tracing::error!("Failed to serialize ping: {}", e),
            }
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => match bincode::deserialize::<GossipMessage>(&buf[..len]) {
                    Ok(msg) => {
                        if let Err(e) = self.handle_message(msg, src).await {
                            tracing::error!("Error handling gossip from {}: {}", src, e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Undecodable gossip datagram from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_message(&self, msg: GossipMessage, src: SocketAddr) -> Result<()> {
        match msg {
            GossipMessage::Ping { from, incarnation } => {
                self.observe(&from, incarnation);
                self.send_ack(src).await?;
            }
            GossipMessage::Ack {
                from,
                incarnation,
                members,
            } => {
                self.observe(&from, incarnation);
                for member in members {
                    self.merge_member(member);
                }
            }
            GossipMessage::Join { mut node } => {
                tracing::info!("Node {:?} joining from {}", node.id, node.gossip_addr);
                node.last_seen = Some(Instant::now());
                self.members.insert(node.id.clone(), node);
                tracing::info!("Cluster size now: {}", self.members.len());
            }
            GossipMessage::Suspect {
                node_id,
                incarnation,
            } => {
                self.handle_suspect(node_id, incarnation).await;
            }
            GossipMessage::Alive {
                node_id,
                incarnation,
            } => {
                self.mark_alive(node_id, incarnation);
            }
        }

        Ok(())
    }

    /// Refreshes a member we just heard from directly.
    fn observe(&self, from: &NodeId, incarnation: u64) {
        if let Some(mut member) = self.members.get_mut(from) {
            member.last_seen = Some(Instant::now());
            if incarnation > member.incarnation {
                member.incarnation = incarnation;
                member.state = NodeState::Alive;
            }
        }
    }

    async fn send_ack(&self, to: SocketAddr) -> Result<()> {
        let members: Vec<Node> = self
            .members
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let ack = GossipMessage::Ack {
            from: self.local_node.id.clone(),
            incarnation: *self.incarnation.read().await,
            members,
        };

        let encoded = bincode::serialize(&ack)?;
        self.socket.send_to(&encoded, to).await?;
        Ok(())
    }

    /// Folds a gossiped member record into the local table. Higher
    /// incarnation always wins; an equal-incarnation Alive claim refutes a
    /// local Suspect verdict.
    pub fn merge_member(&self, incoming: Node) {
        match self.members.get_mut(&incoming.id) {
            Some(mut existing) => {
                if incoming.incarnation > existing.incarnation {
                    existing.state = incoming.state;
                    existing.incarnation = incoming.incarnation;
                    existing.last_seen = Some(Instant::now());
                } else if incoming.incarnation == existing.incarnation
                    && incoming.state == NodeState::Alive
                    && existing.state == NodeState::Suspect
                {
                    tracing::info!("{:?} refuted suspicion", incoming.id);
                    existing.state = NodeState::Alive;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                tracing::info!(
                    "Discovered new member {:?} at {}",
                    incoming.id,
                    incoming.gossip_addr
                );
                let mut member = incoming;
                member.last_seen = Some(Instant::now());
                self.members.insert(member.id.clone(), member);
            }
        }
    }

    async fn handle_suspect(&self, node_id: NodeId, incarnation: u64) {
        if node_id == self.local_node.id {
            // Someone suspects us. Bump our incarnation and refute.
            let refuted = {
                let mut inc = self.incarnation.write().await;
                *inc += 1;
                *inc
            };
            tracing::info!("Refuting suspicion with incarnation {}", refuted);

            if let Some(mut own) = self.members.get_mut(&node_id) {
                own.incarnation = refuted;
                own.state = NodeState::Alive;
                own.last_seen = Some(Instant::now());
            }

            self.broadcast(GossipMessage::Alive {
                node_id,
                incarnation: refuted,
            })
            .await;
            return;
        }

        if let Some(mut member) = self.members.get_mut(&node_id) {
            if incarnation >= member.incarnation && member.state == NodeState::Alive {
                tracing::info!("Node {:?} suspected", member.id);
                member.state = NodeState::Suspect;
                member.incarnation = incarnation;
            }
        }
    }

    fn mark_alive(&self, node_id: NodeId, incarnation: u64) {
        if let Some(mut member) = self.members.get_mut(&node_id) {
            let newer = incarnation > member.incarnation;
            let refutes =
                incarnation == member.incarnation && member.state == NodeState::Suspect;
            if newer || refutes {
                tracing::info!("Node {:?} is Alive (inc={})", member.id, incarnation);
                member.state = NodeState::Alive;
                member.incarnation = incarnation;
                member.last_seen = Some(Instant::now());
            }
        }
    }

    async fn failure_detection_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(2));

        loop {
            interval.tick().await;
            let now = Instant::now();
            let mut suspicions = Vec::new();

            for mut entry in self.members.iter_mut() {
                let member = entry.value_mut();
                if member.id == self.local_node.id {
                    continue;
                }

                let Some(last_seen) = member.last_seen else {
                    member.last_seen = Some(now);
                    continue;
                };
                let silent_for = now.duration_since(last_seen);

                match member.state {
                    NodeState::Alive => {
                        if silent_for > self.config.suspect_after {
                            tracing::warn!(
                                "Node {:?} suspected (silent for {:?})",
                                member.id,
                                silent_for
                            );
                            member.state = NodeState::Suspect;
                            suspicions.push(GossipMessage::Suspect {
                                node_id: member.id.clone(),
                                incarnation: member.incarnation,
                            });
                        }
                    }
                    NodeState::Suspect => {
                        if silent_for > self.config.dead_after {
                            tracing::warn!(
                                "Node {:?} declared dead (silent for {:?})",
                                member.id,
                                silent_for
                            );
                            member.state = NodeState::Dead;
                        }
                    }
                    NodeState::Dead => {}
                }
            }

            for msg in suspicions {
                self.broadcast(msg).await;
            }
        }
    }

    async fn broadcast(&self, msg: GossipMessage) {
        let encoded = match bincode::serialize(&msg) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!("Failed to serialize gossip broadcast: {}", e);
                return;
            }
        };

        let targets: Vec<SocketAddr> = self
            .members
            .iter()
            .filter(|entry| {
                entry.value().id != self.local_node.id
                    && entry.value().state == NodeState::Alive
            })
            .map(|entry| entry.value().gossip_addr)
            .collect();

        for addr in targets {
            if let Err(e) = self.socket.send_to(&encoded, addr).await {
                tracing::warn!("Failed to broadcast to {}: {}", addr, e);
            }
        }
    }
}
