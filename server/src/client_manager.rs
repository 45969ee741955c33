//! UDP peer bookkeeping for the network layer.
//!
//! UDP has no connections, so the server keeps its own table of peers
//! keyed by socket address. Each peer owns a session id (the key the game
//! knows it by), a liveness timestamp refreshed by every packet, and the
//! open flag it shares with its [`crate::network::UdpSession`].

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Peers silent for longer than this are dropped.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct Peer {
    pub session_id: String,
    pub addr: SocketAddr,
    /// Last time we received any packet from this peer
    pub last_seen: Instant,
    /// Cleared when the game closes the session.
    pub open: Arc<AtomicBool>,
}

impl Peer {
    pub fn new(session_id: String, addr: SocketAddr) -> Self {
        Self {
            session_id,
            addr,
            last_seen: Instant::now(),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Connected peers, capped at `max_clients`.
#[derive(Debug)]
pub struct ClientManager {
    peers: HashMap<SocketAddr, Peer>,
    next_session: u64,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            peers: HashMap::new(),
            next_session: 1,
            max_clients,
        }
    }

    /// Registers a peer. Returns its session id and open flag, or `None` if
    /// the server is full.
    pub fn add_peer(&mut self, addr: SocketAddr) -> Option<(String, Arc<AtomicBool>)> {
        if self.peers.len() >= self.max_clients {
            return None;
        }

        let session_id = format!("udp-{}", self.next_session);
        self.next_session += 1;

        let peer = Peer::new(session_id.clone(), addr);
        let open = Arc::clone(&peer.open);
        info!("Client {} connected from {}", session_id, addr);
        self.peers.insert(addr, peer);

        Some((session_id, open))
    }

    pub fn remove_peer(&mut self, addr: SocketAddr) -> Option<Peer> {
        let peer = self.peers.remove(&addr)?;
        info!("Client {} disconnected", peer.session_id);
        Some(peer)
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<&Peer> {
        self.peers.get(&addr)
    }

    /// Refreshes the peer's liveness. Returns its session id and whether the
    /// session is still open.
    pub fn touch(&mut self, addr: SocketAddr) -> Option<(String, bool)> {
        let peer = self.peers.get_mut(&addr)?;
        peer.last_seen = Instant::now();
        Some((peer.session_id.clone(), peer.is_open()))
    }

    /// Removes and returns every peer silent for longer than `timeout`.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<Peer> {
        let expired: Vec<SocketAddr> = self
            .peers
            .values()
            .filter(|peer| peer.is_timed_out(timeout))
            .map(|peer| peer.addr)
            .collect();

        expired
            .into_iter()
            .filter_map(|addr| {
                let peer = self.peers.remove(&addr)?;
                info!("Client {} timed out", peer.session_id);
                Some(peer)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
