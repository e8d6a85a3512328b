//! Validation coordinator
//!
//! Runs on the elected leader. Each validation request opens a vote window
//! sized by the ready-node count at that moment; when the window closes the
//! request is either forwarded verbatim on `final-destination` or dropped.
//! Only one window is open at a time and all window state is owned by the
//! coordinator task.

use crate::agent::NodeAgent;
use crate::registry::SharedRegistry;
use crate::window::{Decision, VoteWindow};
use quorumcast_core::{NodeId, QuorumcastError, QuorumcastResult, Topic};
use quorumcast_p2p::{MessageRouter, ProtocolMessage, Routed, SharedOverlay, ValidationRequest};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Events emitted by the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    /// A request opened a vote window
    WindowOpened { from: String, to: String, total: usize },
    /// A valid vote was counted
    VoteCounted { tally: usize, total: usize },
    /// Quorum reached, payload forwarded
    Approved { tally: usize, total: usize },
    /// Quorum missed
    Rejected { tally: usize, total: usize },
    /// A request arrived while a window was open and was dropped
    Busy { from: String, to: String },
    /// Forwarding an approved payload failed
    PublishFailed(String),
}

/// Create coordinator event channel
pub fn create_coordinator_channel() -> (mpsc::Sender<CoordinatorEvent>, mpsc::Receiver<CoordinatorEvent>) {
    mpsc::channel(100)
}

/// Leader-side vote orchestration
pub struct ValidationCoordinator {
    node: NodeId,
    overlay: SharedOverlay,
    router: Arc<MessageRouter>,
    registry: SharedRegistry,
    event_tx: Option<mpsc::Sender<CoordinatorEvent>>,
}

impl ValidationCoordinator {
    /// Coordinator driven by `leader`'s overlay session
    pub fn new(leader: &NodeAgent, registry: SharedRegistry) -> QuorumcastResult<Self> {
        let not_ready = || QuorumcastError::NodeNotReady(leader.id().to_string());
        let overlay = leader.overlay().ok_or_else(not_ready)?;
        let router = leader.router().ok_or_else(not_ready)?;

        Ok(Self {
            node: leader.id().clone(),
            overlay,
            router,
            registry,
            event_tx: None,
        })
    }

    /// Set event channel
    pub fn set_event_channel(&mut self, tx: mpsc::Sender<CoordinatorEvent>) {
        self.event_tx = Some(tx);
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<QuorumcastResult<()>> {
        tokio::spawn(self.run(shutdown))
    }

    /// Serve validation requests until shutdown or until the overlay stream ends.
    ///
    /// A window still open at shutdown is dropped without a decision. If the
    /// leader cannot subscribe to its topics the failure is logged and the
    /// coordinator stops without serving.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> QuorumcastResult<()> {
        let mut inbox = self.router.register(&[Topic::Validation, Topic::Vote]);
        if let Err(e) = self.subscribe_leader_topics().await {
            error!("[{}] error setting up leader pub/sub: {}", self.node, e);
            return Ok(());
        }
        info!("[{}] leader awaiting validation requests", self.node);

        let mut window: Option<VoteWindow> = None;
        loop {
            let deadline = window.as_ref().map(VoteWindow::deadline);

            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    if let Some(open) = window.take() {
                        info!(
                            "[{}] shutting down with an open window ({} of {} votes), no decision",
                            self.node, open.tally(), open.total()
                        );
                    }
                    break;
                }

                _ = expiry(deadline) => {
                    if let Some(closed) = window.take() {
                        self.close_window(closed).await;
                    }
                }

                routed = inbox.recv() => match routed {
                    Some(routed) => self.handle(routed, &mut window),
                    None => {
                        debug!("[{}] inbox closed", self.node);
                        break;
                    }
                },
            }
        }

        info!("[{}] coordinator stopped", self.node);
        Ok(())
    }

    async fn subscribe_leader_topics(&self) -> QuorumcastResult<()> {
        self.overlay.subscribe(Topic::Validation).await?;
        self.overlay.subscribe(Topic::Vote).await
    }

    fn handle(&self, routed: Routed, window: &mut Option<VoteWindow>) {
        match routed.message {
            ProtocolMessage::ValidationRequest(request) => {
                if let Err(e) = self.open_window(request, routed.payload, window) {
                    warn!("[{}] {}", self.node, e);
                }
            }
            ProtocolMessage::Vote(vote) => match window.as_mut() {
                Some(open) => {
                    if open.record(vote, Instant::now()) {
                        debug!("[{}] vote counted: {}/{}", self.node, open.tally(), open.total());
                        self.emit_event(CoordinatorEvent::VoteCounted {
                            tally: open.tally(),
                            total: open.total(),
                        });
                    }
                }
                None => debug!("[{}] vote outside a window ignored", self.node),
            },
            ProtocolMessage::Final(_) => {}
        }
    }

    fn open_window(
        &self,
        request: ValidationRequest,
        payload: Vec<u8>,
        window: &mut Option<VoteWindow>,
    ) -> QuorumcastResult<()> {
        if window.is_some() {
            self.emit_event(CoordinatorEvent::Busy {
                from: request.from,
                to: request.to,
            });
            return Err(QuorumcastError::WindowBusy);
        }

        let total = self.registry.ready_count();
        info!(
            "[{}] validating {} -> {}, expecting {} votes",
            self.node, request.from, request.to, total
        );
        self.emit_event(CoordinatorEvent::WindowOpened {
            from: request.from.clone(),
            to: request.to.clone(),
            total,
        });
        *window = Some(VoteWindow::open(request, payload, total, Instant::now()));
        Ok(())
    }

    async fn close_window(&self, window: VoteWindow) {
        let (tally, total) = (window.tally(), window.total());

        match window.decide() {
            Decision::Approve => {
                let request = window.request();
                match self
                    .overlay
                    .publish(Topic::FinalDestination, window.payload().to_vec())
                    .await
                {
                    Ok(()) => {
                        info!(
                            "[{}] approved ({}/{}), forwarded {} -> {}",
                            self.node, tally, total, request.from, request.to
                        );
                        self.emit_event(CoordinatorEvent::Approved { tally, total });
                    }
                    Err(e) => {
                        error!("[{}] approved but forwarding failed: {}", self.node, e);
                        self.emit_event(CoordinatorEvent::PublishFailed(e.to_string()));
                    }
                }
            }
            Decision::Reject => {
                warn!(
                    "[{}] rejected: {} of {} valid votes ({:.0}%)",
                    self.node,
                    tally,
                    total,
                    window.ratio() * 100.0
                );
                self.emit_event(CoordinatorEvent::Rejected { tally, total });
            }
        }
    }

    fn emit_event(&self, event: CoordinatorEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.try_send(event);
        }
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
