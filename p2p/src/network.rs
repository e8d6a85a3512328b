//! libp2p network service
//!
//! The service owns the swarm and is driven by a single task. Everything
//! else talks to it through an [`OverlayHandle`], which forwards commands
//! over a channel and implements [`Overlay`].

use crate::behaviour::{ident_topic, QuorumcastBehaviour, QuorumcastBehaviourEvent};
use crate::overlay::{InboundMessage, Overlay, OverlayConnector, SharedOverlay};
use crate::peer::{create_peer_manager, SharedPeerManager};
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{
    gossipsub, identify, identity::Keypair, mdns, swarm::SwarmEvent, Multiaddr, PeerId, Swarm,
};
use quorumcast_core::{NetworkConfig, QuorumcastError, QuorumcastResult, Topic};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 256;

/// Commands accepted by the network service
#[derive(Debug)]
pub enum NetworkCommand {
    Subscribe {
        topic: Topic,
        reply: oneshot::Sender<QuorumcastResult<()>>,
    },
    Unsubscribe {
        topic: Topic,
        reply: oneshot::Sender<QuorumcastResult<()>>,
    },
    Publish {
        topic: Topic,
        payload: Vec<u8>,
        reply: oneshot::Sender<QuorumcastResult<()>>,
    },
    ListenAddrs {
        reply: oneshot::Sender<Vec<Multiaddr>>,
    },
}

/// Network service for one overlay session
pub struct NetworkService {
    swarm: Swarm<QuorumcastBehaviour>,
    peer_manager: SharedPeerManager,
    command_rx: mpsc::Receiver<NetworkCommand>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    listen_addrs: Vec<Multiaddr>,
    emit_self: bool,
    allow_publish_to_zero_peers: bool,
}

impl NetworkService {
    /// Create a new network service
    pub async fn new(
        keypair: Keypair,
        config: &NetworkConfig,
    ) -> Result<(Self, OverlayHandle, mpsc::Receiver<InboundMessage>)> {
        let behaviour = QuorumcastBehaviour::new(&keypair, config)?;
        let local_peer_id = keypair.public().to_peer_id();
        let idle_timeout = Duration::from_secs(config.idle_connection_timeout_secs);

        let mut swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                libp2p::tcp::Config::default(),
                libp2p::noise::Config::new,
                libp2p::yamux::Config::default,
            )?
            .with_behaviour(|_| behaviour)?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_timeout))
            .build();

        let listen_addr: Multiaddr = config.listen_addr.parse()?;
        swarm.listen_on(listen_addr)?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_buffer);
        let peer_manager = create_peer_manager(config.max_peers);

        let mut service = Self {
            swarm,
            peer_manager: peer_manager.clone(),
            command_rx,
            inbound_tx,
            listen_addrs: Vec::new(),
            emit_self: config.emit_self,
            allow_publish_to_zero_peers: config.allow_publish_to_zero_peers,
        };
        service.connect_bootstrap(&config.bootstrap_nodes);

        info!("Network service created for peer {}", local_peer_id);

        let handle = OverlayHandle {
            local_peer_id,
            command_tx,
            peer_manager,
        };

        Ok((service, handle, inbound_rx))
    }

    /// Dial bootstrap nodes; bad addresses are logged and skipped
    pub fn connect_bootstrap(&mut self, nodes: &[String]) {
        for addr_str in nodes {
            match addr_str.parse::<Multiaddr>() {
                Ok(addr) => {
                    info!("Connecting to bootstrap node: {}", addr);
                    if let Err(e) = self.swarm.dial(addr.clone()) {
                        warn!("Failed to dial {}: {}", addr, e);
                    }
                }
                Err(e) => {
                    warn!("Invalid bootstrap address {}: {}", addr_str, e);
                }
            }
        }
    }

    /// Spawn the service on the tokio runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the network event loop until every handle is dropped
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event).await;
                }
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("All overlay handles dropped, stopping network service");
                        break;
                    }
                },
            }
        }
    }

    async fn handle_swarm_event(&mut self, event: SwarmEvent<QuorumcastBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(event) => {
                self.handle_behaviour_event(event).await;
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!("Listening on {}", address);
                self.listen_addrs.push(address);
            }
            SwarmEvent::ExpiredListenAddr { address, .. } => {
                self.listen_addrs.retain(|a| a != &address);
            }
            SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                if self.peer_manager.connection_opened(peer_id) {
                    debug!("Peer connected: {} at {}", peer_id, endpoint.get_remote_address());
                } else {
                    warn!("Peer limit reached, disconnecting {}", peer_id);
                    let _ = self.swarm.disconnect_peer_id(peer_id);
                }
            }
            SwarmEvent::ConnectionClosed { peer_id, num_established, .. } => {
                debug!("Connection to {} closed ({} remaining)", peer_id, num_established);
                self.peer_manager.connection_closed(&peer_id, num_established);
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                warn!("Outgoing connection to {:?} failed: {}", peer_id, error);
            }
            _ => {}
        }
    }

    async fn handle_behaviour_event(&mut self, event: QuorumcastBehaviourEvent) {
        match event {
            QuorumcastBehaviourEvent::Gossipsub(gossipsub::Event::Message { message, .. }) => {
                self.handle_gossip_message(message).await;
            }
            QuorumcastBehaviourEvent::Gossipsub(gossipsub::Event::Subscribed { peer_id, topic }) => {
                debug!("{} subscribed to {}", peer_id, topic);
            }
            QuorumcastBehaviourEvent::Mdns(mdns::Event::Discovered(peers)) => {
                for (peer_id, addr) in peers {
                    self.peer_discovered(peer_id, addr);
                }
            }
            QuorumcastBehaviourEvent::Mdns(mdns::Event::Expired(peers)) => {
                for (peer_id, _) in peers {
                    debug!("mDNS peer expired: {}", peer_id);
                    self.swarm.behaviour_mut().gossipsub.remove_explicit_peer(&peer_id);
                }
            }
            QuorumcastBehaviourEvent::Identify(identify::Event::Received { peer_id, info, .. }) => {
                debug!("Identified {}: {}", peer_id, info.protocol_version);
            }
            _ => {}
        }
    }

    /// Dial a discovered peer and keep it as an explicit gossipsub peer
    pub fn peer_discovered(&mut self, peer_id: PeerId, addr: Multiaddr) {
        info!("Discovered peer: {} at {}", peer_id, addr);
        self.swarm.behaviour_mut().gossipsub.add_explicit_peer(&peer_id);
        if let Err(e) = self.swarm.dial(addr) {
            warn!("Failed to dial discovered peer: {}", e);
        }
    }

    async fn handle_gossip_message(&mut self, message: gossipsub::Message) {
        let topic = match message.topic.as_str().parse::<Topic>() {
            Ok(topic) => topic,
            Err(_) => {
                debug!("Ignoring message on foreign topic {}", message.topic);
                return;
            }
        };

        let inbound = InboundMessage {
            topic,
            payload: message.data,
        };
        if self.inbound_tx.send(inbound).await.is_err() {
            debug!("Inbound receiver dropped, discarding message on {}", topic);
        }
    }

    fn publish(&mut self, topic: Topic, payload: Vec<u8>) -> QuorumcastResult<()> {
        match self.swarm.behaviour_mut().publish(topic, payload.clone()) {
            Ok(id) => debug!("Published {} on {}", id, topic),
            Err(gossipsub::PublishError::InsufficientPeers) if self.allow_publish_to_zero_peers => {
                debug!("No peers subscribed to {} yet", topic);
            }
            Err(e) => {
                return Err(QuorumcastError::PublishFailure(format!("{}: {:?}", topic, e)));
            }
        }

        // Gossipsub never hands our own messages back to us.
        if self.emit_self && self.is_subscribed(topic) {
            let inbound = InboundMessage { topic, payload };
            if let Err(e) = self.inbound_tx.try_send(inbound) {
                warn!("Failed to deliver own message on {}: {}", topic, e);
            }
        }

        Ok(())
    }

    fn is_subscribed(&self, topic: Topic) -> bool {
        let hash = ident_topic(topic).hash();
        self.swarm.behaviour().gossipsub.topics().any(|t| t == &hash)
    }

    fn handle_command(&mut self, command: NetworkCommand) {
        match command {
            NetworkCommand::Subscribe { topic, reply } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .subscribe(topic)
                    .map(|_| ())
                    .map_err(|e| QuorumcastError::Subscription(format!("{}: {:?}", topic, e)));
                let _ = reply.send(result);
            }
            NetworkCommand::Unsubscribe { topic, reply } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .unsubscribe(topic)
                    .map(|_| ())
                    .map_err(|e| QuorumcastError::Subscription(format!("{}: {:?}", topic, e)));
                let _ = reply.send(result);
            }
            NetworkCommand::Publish { topic, payload, reply } => {
                let result = self.publish(topic, payload);
                let _ = reply.send(result);
            }
            NetworkCommand::ListenAddrs { reply } => {
                let _ = reply.send(self.listen_addrs.clone());
            }
        }
    }
}

/// Cloneable handle to a running network service
#[derive(Clone)]
pub struct OverlayHandle {
    local_peer_id: PeerId,
    command_tx: mpsc::Sender<NetworkCommand>,
    peer_manager: SharedPeerManager,
}

impl OverlayHandle {
    pub fn peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Addresses the swarm currently listens on
    pub async fn listen_addrs(&self) -> QuorumcastResult<Vec<Multiaddr>> {
        self.request(|reply| NetworkCommand::ListenAddrs { reply }).await
    }

    async fn request<T, F>(&self, make: F) -> QuorumcastResult<T>
    where
        T: Send,
        F: FnOnce(oneshot::Sender<T>) -> NetworkCommand + Send,
    {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(make(reply))
            .await
            .map_err(|_| QuorumcastError::NetworkError("network service stopped".into()))?;
        rx.await
            .map_err(|_| QuorumcastError::NetworkError("network service dropped the request".into()))
    }
}

#[async_trait]
impl Overlay for OverlayHandle {
    async fn subscribe(&self, topic: Topic) -> QuorumcastResult<()> {
        self.request(|reply| NetworkCommand::Subscribe { topic, reply }).await?
    }

    async fn unsubscribe(&self, topic: Topic) -> QuorumcastResult<()> {
        self.request(|reply| NetworkCommand::Unsubscribe { topic, reply }).await?
    }

    async fn publish(&self, topic: Topic, payload: Vec<u8>) -> QuorumcastResult<()> {
        self.request(|reply| NetworkCommand::Publish { topic, payload, reply }).await?
    }

    fn connected_peers(&self) -> usize {
        self.peer_manager.peer_count()
    }

    fn supports_pubsub(&self) -> bool {
        !self.command_tx.is_closed()
    }

    fn local_peer_id(&self) -> String {
        self.local_peer_id.to_string()
    }
}

/// Start a network service with a given identity
pub async fn spawn_network(
    keypair: Keypair,
    config: &NetworkConfig,
) -> Result<(OverlayHandle, mpsc::Receiver<InboundMessage>, JoinHandle<()>)> {
    let (service, handle, inbound) = NetworkService::new(keypair, config).await?;
    let task = service.spawn();
    Ok((handle, inbound, task))
}

/// Joins the libp2p overlay with a fresh identity per session
pub struct Libp2pConnector {
    config: NetworkConfig,
}

impl Libp2pConnector {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl OverlayConnector for Libp2pConnector {
    async fn join(&self) -> QuorumcastResult<(SharedOverlay, mpsc::Receiver<InboundMessage>)> {
        let (handle, inbound, _task) = spawn_network(Keypair::generate_ed25519(), &self.config)
            .await
            .map_err(|e| QuorumcastError::NetworkError(e.to_string()))?;
        let overlay: SharedOverlay = Arc::new(handle);
        Ok((overlay, inbound))
    }
}
