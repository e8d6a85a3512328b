//! CLI commands
//!
//! Every command joins the overlay as a short-lived participant of its own.

use anyhow::Result;
use libp2p::identity::Keypair;
use quorumcast_core::{NetworkConfig, Topic};
use quorumcast_p2p::{
    spawn_network, FinalMessage, InboundMessage, MessageRouter, ProtocolMessage, SharedOverlay,
    TopicHandler,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Interval between connected-peer checks
pub const PEER_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pause around a publish so subscriptions propagate and the message is flushed
pub const GOSSIP_SETTLE: Duration = Duration::from_secs(1);

/// Overlay session opened by a command
pub struct Session {
    pub overlay: SharedOverlay,
    pub inbound: mpsc::Receiver<InboundMessage>,
}

/// Join the libp2p overlay with a throwaway identity
pub async fn connect(config: &NetworkConfig) -> Result<Session> {
    let (handle, inbound, _task) = spawn_network(Keypair::generate_ed25519(), config).await?;
    info!("Connected to P2P network as {}", handle.peer_id());
    let overlay: SharedOverlay = Arc::new(handle);
    Ok(Session { overlay, inbound })
}

/// Poll until at least one peer is connected; `None` waits forever
pub async fn wait_for_peers(overlay: &SharedOverlay, max_wait: Option<Duration>) -> Result<usize> {
    let started = tokio::time::Instant::now();
    loop {
        let peers = overlay.connected_peers();
        if peers > 0 {
            return Ok(peers);
        }
        if let Some(limit) = max_wait {
            if started.elapsed() >= limit {
                anyhow::bail!("no peer connected within {:?}", limit);
            }
        }
        debug!("Waiting for peer connections...");
        tokio::time::sleep(PEER_POLL_INTERVAL).await;
    }
}

/// Encode and publish one protocol message on its topic
pub async fn publish(overlay: &SharedOverlay, message: impl Into<ProtocolMessage>) -> Result<Vec<u8>> {
    let message = message.into();
    let payload = message.encode()?;
    overlay.publish(message.topic(), payload.clone()).await?;
    Ok(payload)
}

/// Subscription to final messages addressed to one id
pub struct FinalListener {
    id: String,
    _overlay: SharedOverlay,
    finals: TopicHandler,
    router_task: JoinHandle<()>,
}

/// Subscribe to `final-destination` on behalf of `id`
pub async fn listen(session: Session, id: &str) -> Result<FinalListener> {
    session.overlay.subscribe(Topic::FinalDestination).await?;

    let router = MessageRouter::new(id);
    let finals = router.register(&[Topic::FinalDestination]);
    let router_task = router.spawn(session.inbound);

    Ok(FinalListener {
        id: id.to_string(),
        _overlay: session.overlay,
        finals,
        router_task,
    })
}

impl FinalListener {
    /// Surface messages until shutdown; returns how many were surfaced
    pub async fn run<F>(mut self, mut shutdown: watch::Receiver<bool>, mut on_message: F) -> usize
    where
        F: FnMut(FinalMessage),
    {
        let mut surfaced = 0;
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                routed = self.finals.recv() => match routed {
                    Some(routed) => {
                        if let ProtocolMessage::Final(message) = routed.message {
                            if message.to == self.id {
                                surfaced += 1;
                                on_message(message);
                            }
                        }
                    }
                    None => break,
                },
            }
        }
        surfaced
    }
}

impl Drop for FinalListener {
    fn drop(&mut self) {
        self.router_task.abort();
    }
}
