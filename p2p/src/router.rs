//! Per-node message router
//!
//! Consumes the inbound stream of one overlay session, decodes each payload
//! by topic and fans it out to every handler registered for that topic.
//! A handler may cover several topics; it then sees their messages in
//! arrival order. Dropping a [`TopicHandler`] unregisters it.

use crate::message::ProtocolMessage;
use crate::overlay::InboundMessage;
use parking_lot::Mutex;
use quorumcast_core::Topic;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const HANDLER_BUFFER: usize = 256;

/// Decoded message together with the bytes it was decoded from
#[derive(Debug, Clone)]
pub struct Routed {
    pub message: ProtocolMessage,
    pub payload: Vec<u8>,
}

struct HandlerSlot {
    id: u64,
    topics: Vec<Topic>,
    tx: mpsc::Sender<Routed>,
}

/// Handler table keyed by topic
pub struct MessageRouter {
    node: String,
    handlers: Mutex<Vec<HandlerSlot>>,
    next_id: AtomicU64,
}

impl MessageRouter {
    pub fn new(node: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            node: node.into(),
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Register a handler receiving every message on `topics`
    pub fn register(self: &Arc<Self>, topics: &[Topic]) -> TopicHandler {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(HANDLER_BUFFER);

        self.handlers.lock().push(HandlerSlot {
            id,
            topics: topics.to_vec(),
            tx,
        });

        TopicHandler {
            id,
            router: Arc::clone(self),
            rx,
        }
    }

    /// Number of handlers currently registered for `topic`
    pub fn handler_count(&self, topic: Topic) -> usize {
        self.handlers
            .lock()
            .iter()
            .filter(|slot| slot.topics.contains(&topic))
            .count()
    }

    fn unregister(&self, id: u64) {
        self.handlers.lock().retain(|slot| slot.id != id);
    }

    /// Decode and deliver one inbound message
    pub fn dispatch(&self, inbound: InboundMessage) {
        let targets: Vec<mpsc::Sender<Routed>> = self
            .handlers
            .lock()
            .iter()
            .filter(|slot| slot.topics.contains(&inbound.topic))
            .map(|slot| slot.tx.clone())
            .collect();

        if targets.is_empty() {
            debug!("[{}] no handler for {}, dropping message", self.node, inbound.topic);
            return;
        }

        let message = match ProtocolMessage::decode(inbound.topic, &inbound.payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("[{}] dropping malformed message: {}", self.node, e);
                return;
            }
        };

        let routed = Routed {
            message,
            payload: inbound.payload,
        };
        for tx in targets {
            match tx.try_send(routed.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("[{}] handler for {} is full, dropping message", self.node, inbound.topic);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("[{}] handler for {} is gone", self.node, inbound.topic);
                }
            }
        }
    }

    /// Drive the router from an overlay inbound stream
    pub fn spawn(self: &Arc<Self>, mut inbound: mpsc::Receiver<InboundMessage>) -> JoinHandle<()> {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                router.dispatch(message);
            }
            debug!("[{}] inbound stream closed, router stopped", router.node);
        })
    }
}

/// Receiving end of a registered handler
pub struct TopicHandler {
    id: u64,
    router: Arc<MessageRouter>,
    rx: mpsc::Receiver<Routed>,
}

impl TopicHandler {
    pub async fn recv(&mut self) -> Option<Routed> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Routed> {
        self.rx.try_recv().ok()
    }
}

impl Drop for TopicHandler {
    fn drop(&mut self) {
        self.router.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ValidationRequest, Vote};

    fn inbound(topic: Topic, payload: &[u8]) -> InboundMessage {
        InboundMessage {
            topic,
            payload: payload.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_topic() {
        let router = MessageRouter::new("node1");
        let mut votes = router.register(&[Topic::Vote]);
        let mut requests = router.register(&[Topic::Validation]);

        router.dispatch(inbound(Topic::Vote, br#"{"valid":true}"#));
        router.dispatch(inbound(Topic::Validation, br#"{"from":"a","to":"b","data":"c"}"#));

        let vote = votes.recv().await.unwrap();
        assert_eq!(vote.message, ProtocolMessage::Vote(Vote::approve()));
        assert!(votes.try_recv().is_none());

        let request = requests.recv().await.unwrap();
        assert_eq!(
            request.message,
            ProtocolMessage::ValidationRequest(ValidationRequest::new("a", "b", "c"))
        );
        assert_eq!(request.payload, br#"{"from":"a","to":"b","data":"c"}"#.to_vec());
    }

    #[tokio::test]
    async fn test_multi_topic_handler_preserves_arrival_order() {
        let router = MessageRouter::new("leader");
        let mut inbox = router.register(&[Topic::Validation, Topic::Vote]);

        router.dispatch(inbound(Topic::Validation, br#"{"from":"a","to":"b","data":"c"}"#));
        router.dispatch(inbound(Topic::Vote, br#"{"valid":true}"#));

        assert_eq!(inbox.recv().await.unwrap().message.topic(), Topic::Validation);
        assert_eq!(inbox.recv().await.unwrap().message.topic(), Topic::Vote);
    }

    #[tokio::test]
    async fn test_fan_out_to_every_handler() {
        let router = MessageRouter::new("node1");
        let mut first = router.register(&[Topic::Validation]);
        let mut second = router.register(&[Topic::Validation]);

        router.dispatch(inbound(Topic::Validation, br#"{"from":"a","to":"b","data":"c"}"#));

        assert!(first.recv().await.is_some());
        assert!(second.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_malformed_message_dropped() {
        let router = MessageRouter::new("node1");
        let mut votes = router.register(&[Topic::Vote]);

        router.dispatch(inbound(Topic::Vote, b"{broken"));
        router.dispatch(inbound(Topic::Vote, br#"{"valid":false}"#));

        let next = votes.recv().await.unwrap();
        assert_eq!(next.message, ProtocolMessage::Vote(Vote::reject()));
        assert!(votes.try_recv().is_none());
    }

    #[test]
    fn test_drop_unregisters_only_that_handler() {
        let router = MessageRouter::new("node1");
        let first = router.register(&[Topic::Vote]);
        let _second = router.register(&[Topic::Vote, Topic::Validation]);
        assert_eq!(router.handler_count(Topic::Vote), 2);

        drop(first);
        assert_eq!(router.handler_count(Topic::Vote), 1);
        assert_eq!(router.handler_count(Topic::Validation), 1);
    }

    #[tokio::test]
    async fn test_unhandled_topic_is_ignored() {
        let router = MessageRouter::new("node1");
        let mut finals = router.register(&[Topic::FinalDestination]);

        router.dispatch(inbound(Topic::Vote, br#"{"valid":true}"#));
        assert!(finals.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_router_task_drains_inbound_stream() {
        let router = MessageRouter::new("node1");
        let mut finals = router.register(&[Topic::FinalDestination]);
        let (tx, rx) = mpsc::channel(8);
        let task = router.spawn(rx);

        tx.send(inbound(Topic::FinalDestination, br#"{"from":"a","to":"b","data":"c"}"#))
            .await
            .unwrap();
        drop(tx);

        assert!(finals.recv().await.is_some());
        task.await.unwrap();
    }
}
