//! Peer management

use libp2p::PeerId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Tracks open connections per peer, bounded by `max_peers`
pub struct PeerManager {
    connections: RwLock<HashMap<PeerId, u32>>,
    max_peers: usize,
}

impl PeerManager {
    pub fn new(max_peers: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            max_peers,
        }
    }

    /// Record an established connection (returns false if over capacity)
    pub fn connection_opened(&self, peer_id: PeerId) -> bool {
        let mut connections = self.connections.write();

        if let Some(count) = connections.get_mut(&peer_id) {
            *count += 1;
            return true;
        }

        if connections.len() >= self.max_peers {
            return false;
        }

        connections.insert(peer_id, 1);
        true
    }

    /// Record a closed connection; the peer is dropped once none remain
    pub fn connection_closed(&self, peer_id: &PeerId, remaining: u32) {
        let mut connections = self.connections.write();
        if remaining == 0 {
            connections.remove(peer_id);
        } else if let Some(count) = connections.get_mut(peer_id) {
            *count = remaining;
        }
    }

    /// Number of connected peers
    pub fn peer_count(&self) -> usize {
        self.connections.read().len()
    }
}

/// Shared peer manager
pub type SharedPeerManager = Arc<PeerManager>;

/// Create a shared peer manager
pub fn create_peer_manager(max_peers: usize) -> SharedPeerManager {
    Arc::new(PeerManager::new(max_peers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_manager() {
        let manager = PeerManager::new(10);
        let peer1 = PeerId::random();
        let peer2 = PeerId::random();

        assert!(manager.connection_opened(peer1));
        assert!(manager.connection_opened(peer2));
        assert_eq!(manager.peer_count(), 2);

        manager.connection_closed(&peer1, 0);
        assert_eq!(manager.peer_count(), 1);
    }

    #[test]
    fn test_multiple_connections_same_peer() {
        let manager = PeerManager::new(10);
        let peer = PeerId::random();

        manager.connection_opened(peer);
        manager.connection_opened(peer);
        assert_eq!(manager.peer_count(), 1);

        manager.connection_closed(&peer, 1);
        assert_eq!(manager.peer_count(), 1);

        manager.connection_closed(&peer, 0);
        assert_eq!(manager.peer_count(), 0);
    }

    #[test]
    fn test_max_peers() {
        let manager = PeerManager::new(2);
        let first = PeerId::random();

        assert!(manager.connection_opened(first));
        assert!(manager.connection_opened(PeerId::random()));
        assert!(!manager.connection_opened(PeerId::random()));
        assert!(manager.connection_opened(first));
        assert_eq!(manager.peer_count(), 2);
    }
}
