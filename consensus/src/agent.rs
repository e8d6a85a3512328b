//! Node agent: one simulated participant on the overlay

use crate::leader::LeaderCandidate;
use crate::registry::ReadyRegistry;
use parking_lot::RwLock;
use quorumcast_core::{NodeId, QuorumcastError, QuorumcastResult, Topic};
use quorumcast_p2p::{
    FinalMessage, MessageRouter, OverlayConnector, ProtocolMessage, SharedOverlay, TopicHandler,
    Vote,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Live overlay session of a started agent
struct AgentSession {
    overlay: SharedOverlay,
    router: Arc<MessageRouter>,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for AgentSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// A participant with a static rating and a readiness flag
pub struct NodeAgent {
    id: NodeId,
    rating: f64,
    ready: AtomicBool,
    session: RwLock<Option<AgentSession>>,
    deliveries: Option<mpsc::Sender<FinalMessage>>,
}

impl NodeAgent {
    pub fn new(id: impl Into<NodeId>, rating: f64) -> Self {
        Self {
            id: id.into(),
            rating,
            ready: AtomicBool::new(false),
            session: RwLock::new(None),
            deliveries: None,
        }
    }

    /// Also hand every final message addressed to this node to `tx`
    pub fn with_delivery_sink(mut self, tx: mpsc::Sender<FinalMessage>) -> Self {
        self.deliveries = Some(tx);
        self
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn rating(&self) -> f64 {
        self.rating
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Overlay session, once started
    pub fn overlay(&self) -> Option<SharedOverlay> {
        self.session.read().as_ref().map(|s| Arc::clone(&s.overlay))
    }

    /// Message router of the session, once started
    pub fn router(&self) -> Option<Arc<MessageRouter>> {
        self.session.read().as_ref().map(|s| Arc::clone(&s.router))
    }

    /// Join the overlay and listen for final messages.
    ///
    /// On success the agent becomes ready and is appended to `registry`.
    /// Failures are logged and leave the agent not ready; they never
    /// propagate to the caller.
    pub async fn start(self: &Arc<Self>, connector: &dyn OverlayConnector, registry: &ReadyRegistry) -> bool {
        if self.is_ready() {
            return true;
        }

        match self.join(connector).await {
            Ok(session) => {
                let peer = session.overlay.local_peer_id();
                *self.session.write() = Some(session);
                self.ready.store(true, Ordering::Release);
                registry.register(Arc::clone(self));
                info!("[{}] ready (rating {:.3}, peer {})", self.id, self.rating, peer);
                true
            }
            Err(e) => {
                let err = QuorumcastError::StartupFailure {
                    node: self.id.to_string(),
                    reason: e.to_string(),
                };
                error!("{}", err);
                false
            }
        }
    }

    async fn join(&self, connector: &dyn OverlayConnector) -> QuorumcastResult<AgentSession> {
        let (overlay, inbound) = connector.join().await?;
        overlay.subscribe(Topic::FinalDestination).await?;

        let router = MessageRouter::new(self.id.as_str());
        let finals = router.register(&[Topic::FinalDestination]);
        let router_task = router.spawn(inbound);
        let final_task = tokio::spawn(surface_finals(
            self.id.clone(),
            finals,
            self.deliveries.clone(),
        ));

        Ok(AgentSession {
            overlay,
            router,
            tasks: vec![router_task, final_task],
        })
    }

    /// Vote `valid` on every validation request this agent observes
    pub async fn enable_auto_vote(&self) -> QuorumcastResult<()> {
        let (overlay, router) = self
            .overlay()
            .zip(self.router())
            .ok_or_else(|| QuorumcastError::NodeNotReady(self.id.to_string()))?;

        overlay.subscribe(Topic::Validation).await?;
        let requests = router.register(&[Topic::Validation]);
        let task = tokio::spawn(auto_vote(self.id.clone(), overlay, requests));

        match self.session.write().as_mut() {
            Some(session) => session.tasks.push(task),
            None => task.abort(),
        }
        Ok(())
    }

    /// Encode and publish a protocol message on its topic
    pub async fn publish(&self, message: impl Into<ProtocolMessage>) -> QuorumcastResult<()> {
        let overlay = self
            .overlay()
            .ok_or_else(|| QuorumcastError::NodeNotReady(self.id.to_string()))?;
        let message = message.into();
        overlay.publish(message.topic(), message.encode()?).await
    }

    /// Drop the session and stop every background task
    pub fn shutdown(&self) {
        self.ready.store(false, Ordering::Release);
        self.session.write().take();
    }
}

impl LeaderCandidate for NodeAgent {
    fn rating(&self) -> f64 {
        self.rating
    }

    fn is_eligible(&self) -> bool {
        self.is_ready()
            && self
                .session
                .read()
                .as_ref()
                .map(|s| s.overlay.supports_pubsub())
                .unwrap_or(false)
    }
}

impl std::fmt::Debug for NodeAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeAgent")
            .field("id", &self.id)
            .field("rating", &self.rating)
            .field("ready", &self.is_ready())
            .finish()
    }
}

async fn surface_finals(
    id: NodeId,
    mut finals: TopicHandler,
    deliveries: Option<mpsc::Sender<FinalMessage>>,
) {
    while let Some(routed) = finals.recv().await {
        let ProtocolMessage::Final(message) = routed.message else {
            continue;
        };
        if message.to != id.as_str() {
            continue;
        }

        info!("[{}] received message from {}: {}", id, message.from, message.data);
        if let Some(tx) = &deliveries {
            if tx.try_send(message).is_err() {
                warn!("[{}] delivery sink unavailable", id);
            }
        }
    }
}

async fn auto_vote(id: NodeId, overlay: SharedOverlay, mut requests: TopicHandler) {
    let ballot = match ProtocolMessage::from(Vote::approve()).encode() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("[{}] cannot encode vote: {}", id, e);
            return;
        }
    };

    while let Some(routed) = requests.recv().await {
        if let ProtocolMessage::ValidationRequest(request) = routed.message {
            debug!("[{}] voting valid on {} -> {}", id, request.from, request.to);
            if let Err(e) = overlay.publish(Topic::Vote, ballot.clone()).await {
                warn!("[{}] failed to publish vote: {}", id, e);
            }
        }
    }
}
