//! In-memory overlay for tests and socket-free simulations
//!
//! Every session on a hub sees every other session as a connected peer.
//! Publishing delivers to all subscribed sessions, the publisher included,
//! and succeeds even when nobody is subscribed.

use crate::overlay::{InboundMessage, Overlay, OverlayConnector, SharedOverlay};
use async_trait::async_trait;
use parking_lot::RwLock;
use quorumcast_core::{QuorumcastError, QuorumcastResult, Topic};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

const DEFAULT_BUFFER: usize = 1000;

struct SessionState {
    peer_id: String,
    topics: RwLock<HashSet<Topic>>,
    inbound: mpsc::Sender<InboundMessage>,
    open: AtomicBool,
}

impl SessionState {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Shared message fabric for in-memory sessions
pub struct MemoryHub {
    sessions: RwLock<Vec<Arc<SessionState>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            buffer,
        })
    }

    /// Open a new session on the hub
    pub fn join(self: &Arc<Self>) -> (Arc<MemorySession>, mpsc::Receiver<InboundMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        let state = Arc::new(SessionState {
            peer_id: format!("mem-{}", id),
            topics: RwLock::new(HashSet::new()),
            inbound: tx,
            open: AtomicBool::new(true),
        });
        self.sessions.write().push(state.clone());

        let session = Arc::new(MemorySession {
            hub: Arc::clone(self),
            state,
        });
        (session, rx)
    }

    /// Connector that opens sessions on this hub
    pub fn connector(self: &Arc<Self>) -> MemoryConnector {
        MemoryConnector {
            hub: Arc::clone(self),
            failure: None,
        }
    }

    /// Connector whose every join attempt fails
    pub fn failing_connector(self: &Arc<Self>, reason: impl Into<String>) -> MemoryConnector {
        MemoryConnector {
            hub: Arc::clone(self),
            failure: Some(reason.into()),
        }
    }

    /// Number of sessions still open
    pub fn open_sessions(&self) -> usize {
        self.sessions.read().iter().filter(|s| s.is_open()).count()
    }

    fn deliver(&self, topic: Topic, payload: &[u8]) {
        let sessions = self.sessions.read();
        for session in sessions.iter().filter(|s| s.is_open()) {
            if !session.topics.read().contains(&topic) {
                continue;
            }
            let message = InboundMessage {
                topic,
                payload: payload.to_vec(),
            };
            match session.inbound.try_send(message) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Inbound queue of {} is full, dropping message on {}", session.peer_id, topic);
                }
            }
        }
    }
}

/// One session on a [`MemoryHub`]
pub struct MemorySession {
    hub: Arc<MemoryHub>,
    state: Arc<SessionState>,
}

impl MemorySession {
    /// Tear the session down; it stops receiving and can no longer publish
    pub fn close(&self) {
        self.state.open.store(false, Ordering::Release);
    }
}

#[async_trait]
impl Overlay for MemorySession {
    async fn subscribe(&self, topic: Topic) -> QuorumcastResult<()> {
        if !self.state.is_open() {
            return Err(QuorumcastError::Subscription(format!("{}: session closed", topic)));
        }
        self.state.topics.write().insert(topic);
        Ok(())
    }

    async fn unsubscribe(&self, topic: Topic) -> QuorumcastResult<()> {
        self.state.topics.write().remove(&topic);
        Ok(())
    }

    async fn publish(&self, topic: Topic, payload: Vec<u8>) -> QuorumcastResult<()> {
        if !self.state.is_open() {
            return Err(QuorumcastError::PublishFailure(format!("{}: session closed", topic)));
        }
        self.hub.deliver(topic, &payload);
        Ok(())
    }

    fn connected_peers(&self) -> usize {
        if !self.state.is_open() {
            return 0;
        }
        self.hub.open_sessions().saturating_sub(1)
    }

    fn supports_pubsub(&self) -> bool {
        self.state.is_open()
    }

    fn local_peer_id(&self) -> String {
        self.state.peer_id.clone()
    }
}

/// [`OverlayConnector`] backed by a [`MemoryHub`]
pub struct MemoryConnector {
    hub: Arc<MemoryHub>,
    failure: Option<String>,
}

#[async_trait]
impl OverlayConnector for MemoryConnector {
    async fn join(&self) -> QuorumcastResult<(SharedOverlay, mpsc::Receiver<InboundMessage>)> {
        if let Some(reason) = &self.failure {
            return Err(QuorumcastError::ConnectionFailed(reason.clone()));
        }
        let (session, inbound) = self.hub.join();
        let session: SharedOverlay = session;
        Ok((session, inbound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers_including_self() {
        let hub = MemoryHub::new();
        let (a, mut a_rx) = hub.join();
        let (b, mut b_rx) = hub.join();
        let (_c, mut c_rx) = hub.join();

        a.subscribe(Topic::FinalDestination).await.unwrap();
        b.subscribe(Topic::FinalDestination).await.unwrap();

        a.publish(Topic::FinalDestination, b"hello".to_vec()).await.unwrap();

        assert_eq!(a_rx.recv().await.unwrap().payload, b"hello".to_vec());
        assert_eq!(b_rx.recv().await.unwrap().topic, Topic::FinalDestination);
        assert!(c_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_to_zero_subscribers_succeeds() {
        let hub = MemoryHub::new();
        let (a, _rx) = hub.join();
        assert!(a.publish(Topic::Vote, b"{}".to_vec()).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_session() {
        let hub = MemoryHub::new();
        let (a, _a_rx) = hub.join();
        let (b, _b_rx) = hub.join();
        assert_eq!(a.connected_peers(), 1);

        b.close();
        assert!(!b.supports_pubsub());
        assert_eq!(a.connected_peers(), 0);
        assert!(b.publish(Topic::Vote, vec![]).await.is_err());
        assert!(b.subscribe(Topic::Vote).await.is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let hub = MemoryHub::new();
        let (a, mut rx) = hub.join();
        a.subscribe(Topic::Vote).await.unwrap();
        a.unsubscribe(Topic::Vote).await.unwrap();

        a.publish(Topic::Vote, b"{}".to_vec()).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failing_connector() {
        let hub = MemoryHub::new();
        let connector = hub.failing_connector("transport unavailable");
        assert!(matches!(
            connector.join().await,
            Err(QuorumcastError::ConnectionFailed(_))
        ));
        assert_eq!(hub.open_sessions(), 0);
    }
}
