//! Network behaviour for libp2p

use anyhow::anyhow;
use libp2p::{
    gossipsub::{self, IdentTopic, MessageAuthenticity, ValidationMode},
    identify,
    identity::Keypair,
    mdns,
    swarm::{behaviour::toggle::Toggle, NetworkBehaviour},
};
use quorumcast_core::{NetworkConfig, Topic};
use std::time::Duration;

/// Identify protocol version advertised to peers
pub const PROTOCOL_VERSION: &str = "/quorumcast/1.0.0";

/// Combined network behaviour
#[derive(NetworkBehaviour)]
pub struct QuorumcastBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    pub identify: identify::Behaviour,
}

impl QuorumcastBehaviour {
    pub fn new(keypair: &Keypair, config: &NetworkConfig) -> anyhow::Result<Self> {
        // Default message ids (source + sequence number) keep identical
        // ballots from different voters distinct.
        let gossipsub_config = gossipsub::ConfigBuilder::default()
            .heartbeat_interval(Duration::from_millis(config.heartbeat_interval_ms))
            .validation_mode(ValidationMode::Strict)
            .build()
            .map_err(|e| anyhow!("Failed to build gossipsub config: {:?}", e))?;

        let gossipsub = gossipsub::Behaviour::new(
            MessageAuthenticity::Signed(keypair.clone()),
            gossipsub_config,
        )
        .map_err(|e| anyhow!("Failed to create gossipsub: {}", e))?;

        let peer_id = keypair.public().to_peer_id();
        let mdns = if config.enable_mdns {
            Some(mdns::tokio::Behaviour::new(mdns::Config::default(), peer_id)?)
        } else {
            None
        };

        let identify = identify::Behaviour::new(identify::Config::new(
            PROTOCOL_VERSION.to_string(),
            keypair.public(),
        ));

        Ok(Self {
            gossipsub,
            mdns: Toggle::from(mdns),
            identify,
        })
    }

    /// Subscribe to a protocol topic
    pub fn subscribe(&mut self, topic: Topic) -> Result<bool, gossipsub::SubscriptionError> {
        self.gossipsub.subscribe(&ident_topic(topic))
    }

    /// Unsubscribe from a protocol topic
    pub fn unsubscribe(&mut self, topic: Topic) -> Result<bool, gossipsub::PublishError> {
        self.gossipsub.unsubscribe(&ident_topic(topic))
    }

    /// Publish a message to a topic
    pub fn publish(
        &mut self,
        topic: Topic,
        data: Vec<u8>,
    ) -> Result<gossipsub::MessageId, gossipsub::PublishError> {
        self.gossipsub.publish(ident_topic(topic), data)
    }
}

/// Gossipsub topic for a protocol topic
pub fn ident_topic(topic: Topic) -> IdentTopic {
    IdentTopic::new(topic.as_str())
}
