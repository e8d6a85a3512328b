//! Simulation of several rated agents on one overlay
//!
//! All agents start concurrently and the validation phase only begins once
//! every start attempt has finished. The highest-rated ready agent then
//! coordinates votes until shutdown.

use anyhow::Result;
use futures::future::join_all;
use quorumcast_consensus::{
    CoordinatorEvent, NodeAgent, ReadyRegistry, SharedRegistry, ValidationCoordinator,
};
use quorumcast_core::{QuorumcastResult, SimulationConfig};
use quorumcast_p2p::{FinalMessage, OverlayConnector, ValidationRequest};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Delay before the demo request is published, so the leader is listening
pub const DEMO_REQUEST_DELAY: Duration = Duration::from_millis(500);

/// One simulation run
pub struct Simulation {
    config: SimulationConfig,
    connector: Arc<dyn OverlayConnector>,
    registry: SharedRegistry,
    agents: Vec<Arc<NodeAgent>>,
    ratings: Option<Vec<f64>>,
    deliveries: Option<mpsc::Sender<FinalMessage>>,
    events: Option<mpsc::Sender<CoordinatorEvent>>,
    demo_request: Option<ValidationRequest>,
}

impl Simulation {
    pub fn new(config: SimulationConfig, connector: Arc<dyn OverlayConnector>) -> Self {
        Self {
            config,
            connector,
            registry: Arc::new(ReadyRegistry::new()),
            agents: Vec::new(),
            ratings: None,
            deliveries: None,
            events: None,
            demo_request: None,
        }
    }

    /// Use fixed ratings instead of random ones, in role order
    pub fn with_ratings(mut self, ratings: Vec<f64>) -> Self {
        self.ratings = Some(ratings);
        self
    }

    /// Receive every final message surfaced by any agent
    pub fn with_delivery_sink(mut self, tx: mpsc::Sender<FinalMessage>) -> Self {
        self.deliveries = Some(tx);
        self
    }

    /// Receive the leader's coordinator events
    pub fn with_event_channel(mut self, tx: mpsc::Sender<CoordinatorEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Have the first ready agent publish `request` once the leader is up
    pub fn with_demo_request(mut self, request: ValidationRequest) -> Self {
        self.demo_request = Some(request);
        self
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn agents(&self) -> &[Arc<NodeAgent>] {
        &self.agents
    }

    /// Start one agent per role concurrently; returns the ready count
    pub async fn start_agents(&mut self) -> usize {
        let ratings = match &self.ratings {
            Some(fixed) => fixed.clone(),
            None => random_ratings(self.config.roles.len()),
        };

        self.agents = self
            .config
            .roles
            .iter()
            .zip(ratings)
            .map(|(role, rating)| {
                let agent = NodeAgent::new(role.as_str(), rating);
                let agent = match &self.deliveries {
                    Some(tx) => agent.with_delivery_sink(tx.clone()),
                    None => agent,
                };
                Arc::new(agent)
            })
            .collect();

        let connector = self.connector.as_ref();
        let registry = self.registry.as_ref();
        join_all(self.agents.iter().map(|agent| agent.start(connector, registry))).await;

        let ready = self.registry.ready_count();
        info!("Ready nodes with pubsub: {}/{}", ready, self.config.roles.len());
        ready
    }

    /// Elect the leader among the ready agents
    pub fn elect_leader(&self) -> QuorumcastResult<Arc<NodeAgent>> {
        let leader = self.registry.elect_leader()?;
        info!("Leader selected: {} (rating {:.3})", leader.id(), leader.rating());
        Ok(leader)
    }

    /// Start, elect and coordinate until `shutdown` fires.
    ///
    /// Without a leader the validation phase is skipped and the run ends.
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.start_agents().await;

        let leader = match self.elect_leader() {
            Ok(leader) => leader,
            Err(e) => {
                error!("{}", e);
                self.stop();
                return Ok(());
            }
        };

        if self.config.auto_vote {
            for agent in self.registry.snapshot() {
                if let Err(e) = agent.enable_auto_vote().await {
                    warn!("[{}] auto vote unavailable: {}", agent.id(), e);
                }
            }
        }

        let mut coordinator = ValidationCoordinator::new(&leader, Arc::clone(&self.registry))?;
        if let Some(tx) = self.events.take() {
            coordinator.set_event_channel(tx);
        }

        if let Some(request) = self.demo_request.take() {
            if let Some(sender) = self.registry.snapshot().into_iter().next() {
                tokio::spawn(async move {
                    tokio::time::sleep(DEMO_REQUEST_DELAY).await;
                    info!("[{}] sending demo request {} -> {}", sender.id(), request.from, request.to);
                    if let Err(e) = sender.publish(request).await {
                        warn!("[{}] demo request failed: {}", sender.id(), e);
                    }
                });
            }
        }

        let result = coordinator.run(shutdown).await;
        self.stop();
        Ok(result?)
    }

    fn stop(&self) {
        for agent in &self.agents {
            agent.shutdown();
        }
    }
}

fn random_ratings(count: usize) -> Vec<f64> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| rng.gen::<f64>()).collect()
}
