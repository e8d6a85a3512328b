//! Registry of agents that finished startup

use crate::agent::NodeAgent;
use crate::leader::{select_leader, LeaderCandidate};
use parking_lot::RwLock;
use quorumcast_core::{QuorumcastError, QuorumcastResult};
use std::sync::Arc;

/// Append-only list of ready agents, in the order they became ready
#[derive(Debug, Default)]
pub struct ReadyRegistry {
    agents: RwLock<Vec<Arc<NodeAgent>>>,
}

/// Registry shared between the orchestration context and the coordinator
pub type SharedRegistry = Arc<ReadyRegistry>;

impl ReadyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an agent; registering the same id twice is a no-op
    pub fn register(&self, agent: Arc<NodeAgent>) {
        let mut agents = self.agents.write();
        if agents.iter().any(|a| a.id() == agent.id()) {
            return;
        }
        agents.push(agent);
    }

    /// Agents in registration order
    pub fn snapshot(&self) -> Vec<Arc<NodeAgent>> {
        self.agents.read().clone()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }

    /// Agents that are ready with a live pub/sub session
    pub fn ready_count(&self) -> usize {
        self.agents.read().iter().filter(|a| a.is_eligible()).count()
    }

    /// Elect the leader from the current pool
    pub fn elect_leader(&self) -> QuorumcastResult<Arc<NodeAgent>> {
        let agents = self.agents.read();
        select_leader(agents.as_slice())
            .cloned()
            .ok_or(QuorumcastError::NoLeaderAvailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorumcast_p2p::MemoryHub;

    #[tokio::test]
    async fn test_elects_highest_rated_ready_agent() {
        let hub = MemoryHub::new();
        let registry = ReadyRegistry::new();

        for (id, rating) in [("node1", 0.2), ("node2", 0.8), ("node3", 0.5)] {
            let agent = Arc::new(NodeAgent::new(id, rating));
            assert!(agent.start(&hub.connector(), &registry).await);
        }

        assert_eq!(registry.ready_count(), 3);
        assert_eq!(registry.elect_leader().unwrap().id().as_str(), "node2");
    }

    #[tokio::test]
    async fn test_failed_agent_never_elected() {
        let hub = MemoryHub::new();
        let registry = ReadyRegistry::new();

        let broken = Arc::new(NodeAgent::new("node1", 0.99));
        assert!(!broken.start(&hub.failing_connector("dial timeout"), &registry).await);
        let working = Arc::new(NodeAgent::new("node2", 0.1));
        assert!(working.start(&hub.connector(), &registry).await);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.elect_leader().unwrap().id().as_str(), "node2");
    }

    #[test]
    fn test_empty_registry_has_no_leader() {
        let registry = ReadyRegistry::new();
        assert!(matches!(
            registry.elect_leader(),
            Err(QuorumcastError::NoLeaderAvailable)
        ));
        assert_eq!(registry.ready_count(), 0);
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let hub = MemoryHub::new();
        let registry = ReadyRegistry::new();
        let agent = Arc::new(NodeAgent::new("node1", 0.3));
        assert!(agent.start(&hub.connector(), &registry).await);

        registry.register(Arc::clone(&agent));
        assert!(agent.start(&hub.connector(), &registry).await);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_ready_count_ignores_dead_sessions() {
        let hub = MemoryHub::new();
        let registry = ReadyRegistry::new();
        let first = Arc::new(NodeAgent::new("node1", 0.3));
        let second = Arc::new(NodeAgent::new("node2", 0.6));
        assert!(first.start(&hub.connector(), &registry).await);
        assert!(second.start(&hub.connector(), &registry).await);

        second.shutdown();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ready_count(), 1);
        assert_eq!(registry.elect_leader().unwrap().id().as_str(), "node1");
    }
}
