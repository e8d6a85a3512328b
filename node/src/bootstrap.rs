//! Bootstrap peer
//!
//! A well-known overlay member that other nodes dial first. It carries no
//! protocol role, but subscribes to every protocol topic so gossip can be
//! relayed through it when peers only know the bootstrap address.

use crate::keys::load_or_create_keypair;
use anyhow::Result;
use libp2p::{Multiaddr, PeerId};
use quorumcast_core::{NetworkConfig, Topic};
use quorumcast_p2p::{spawn_network, InboundMessage, Overlay, OverlayHandle};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const LISTEN_POLL: Duration = Duration::from_millis(100);
const LISTEN_POLL_ATTEMPTS: usize = 50;

/// Bootstrap process settings
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub listen_addr: String,
    pub key_file: PathBuf,
    pub network: NetworkConfig,
}

/// A running bootstrap peer
pub struct BootstrapNode {
    handle: OverlayHandle,
    inbound: mpsc::Receiver<InboundMessage>,
    listen_addrs: Vec<Multiaddr>,
}

impl BootstrapNode {
    /// Load the identity, start the network service and wait for listeners
    pub async fn start(options: BootstrapOptions) -> Result<Self> {
        let keypair = load_or_create_keypair(&options.key_file)?;

        let mut network = options.network;
        network.listen_addr = options.listen_addr;
        network.bootstrap_nodes.clear();

        let (handle, inbound, _task) = spawn_network(keypair, &network).await?;
        for topic in Topic::ALL {
            handle.subscribe(topic).await?;
        }

        let listen_addrs = wait_for_listeners(&handle).await;
        if listen_addrs.is_empty() {
            warn!("No listen address reported yet");
        }

        Ok(Self {
            handle,
            inbound,
            listen_addrs,
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.handle.peer_id()
    }

    pub fn listen_addrs(&self) -> &[Multiaddr] {
        &self.listen_addrs
    }

    /// Full dialable addresses, `/p2p/<peer id>` appended
    pub fn dial_addrs(&self) -> Vec<String> {
        self.listen_addrs
            .iter()
            .map(|addr| format!("{}/p2p/{}", addr, self.peer_id()))
            .collect()
    }

    /// Relay until shutdown, draining what the local subscriptions receive
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                message = self.inbound.recv() => match message {
                    Some(message) => debug!("Relayed {} bytes on {}", message.payload.len(), message.topic),
                    None => {
                        warn!("Network service stopped");
                        break;
                    }
                },
            }
        }

        info!("Bootstrap node {} shutting down", self.peer_id());
        Ok(())
    }
}

async fn wait_for_listeners(handle: &OverlayHandle) -> Vec<Multiaddr> {
    for _ in 0..LISTEN_POLL_ATTEMPTS {
        match handle.listen_addrs().await {
            Ok(addrs) if !addrs.is_empty() => return addrs,
            Ok(_) => tokio::time::sleep(LISTEN_POLL).await,
            Err(e) => {
                warn!("Cannot query listen addresses: {}", e);
                break;
            }
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(name: &str) -> BootstrapOptions {
        let key_file = std::env::temp_dir()
            .join(format!("quorumcast-bootstrap-{}-{}", std::process::id(), name))
            .join("bootstrap_key.json");
        BootstrapOptions {
            listen_addr: "/ip4/127.0.0.1/tcp/0".to_string(),
            key_file,
            network: NetworkConfig {
                enable_mdns: false,
                ..NetworkConfig::default()
            },
        }
    }

    #[tokio::test]
    async fn test_bootstrap_reports_dialable_address() {
        let opts = options("dial");
        let node = BootstrapNode::start(opts.clone()).await.unwrap();

        assert!(!node.listen_addrs().is_empty());
        let suffix = format!("/p2p/{}", node.peer_id());
        assert!(node.dial_addrs().iter().all(|a| a.ends_with(&suffix)));

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(node.run(rx));
        tx.send(true).unwrap();
        task.await.unwrap().unwrap();

        let _ = std::fs::remove_dir_all(opts.key_file.parent().unwrap());
    }

    #[tokio::test]
    async fn test_bootstrap_identity_is_stable() {
        let opts = options("stable");
        let first = BootstrapNode::start(opts.clone()).await.unwrap().peer_id();
        let second = BootstrapNode::start(opts.clone()).await.unwrap().peer_id();
        assert_eq!(first, second);

        let _ = std::fs::remove_dir_all(opts.key_file.parent().unwrap());
    }
}
