//! Overlay capability contract
//!
//! The validation protocol only needs topic subscription, publishing, an
//! inbound message stream and a connected-peer count. Both the libp2p
//! network service and the in-memory hub implement this seam.

use async_trait::async_trait;
use quorumcast_core::{QuorumcastResult, Topic};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Raw message delivered by the overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: Topic,
    pub payload: Vec<u8>,
}

/// A joined overlay session
#[async_trait]
pub trait Overlay: Send + Sync {
    /// Start receiving messages published on `topic`
    async fn subscribe(&self, topic: Topic) -> QuorumcastResult<()>;

    /// Stop receiving messages published on `topic`
    async fn unsubscribe(&self, topic: Topic) -> QuorumcastResult<()>;

    /// Publish a payload to every subscriber of `topic`
    async fn publish(&self, topic: Topic, payload: Vec<u8>) -> QuorumcastResult<()>;

    /// Number of currently connected peers
    fn connected_peers(&self) -> usize;

    /// Whether the pub/sub service behind this session is still alive
    fn supports_pubsub(&self) -> bool;

    /// Overlay-level identity of this session
    fn local_peer_id(&self) -> String;
}

/// Shared overlay session
pub type SharedOverlay = Arc<dyn Overlay>;

/// Factory for overlay sessions
#[async_trait]
pub trait OverlayConnector: Send + Sync {
    /// Join the overlay, returning the session and its inbound stream
    async fn join(&self) -> QuorumcastResult<(SharedOverlay, mpsc::Receiver<InboundMessage>)>;
}
