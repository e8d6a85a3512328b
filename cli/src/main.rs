//! Quorumcast CLI - standalone overlay participants

mod commands;

use clap::{Parser, Subcommand};
use commands::{connect, listen, publish, wait_for_peers, GOSSIP_SETTLE};
use quorumcast_core::NodeConfig;
use quorumcast_p2p::{FinalMessage, ValidationRequest, Vote};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quorumcast")]
#[command(about = "Quorumcast - send, receive and vote on the overlay")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bootstrap peer address (repeatable)
    #[arg(short, long, global = true)]
    bootstrap: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish one message directly on final-destination
    Send {
        #[arg(long, default_value = "Computer_A")]
        from: String,

        #[arg(long, default_value = "Computer_B")]
        to: String,

        #[arg(long, default_value = "Hello from A!")]
        data: String,
    },

    /// Print messages addressed to an id
    Receive {
        #[arg(long, default_value = "Computer_B")]
        id: String,
    },

    /// Ask the leader to validate a transfer
    Request {
        #[arg(long, default_value = "Computer_A")]
        from: String,

        #[arg(long, default_value = "Computer_B")]
        to: String,

        #[arg(long, default_value = "Hello from A!")]
        data: String,
    },

    /// Cast one vote for the open window
    Vote {
        /// Vote invalid instead of valid
        #[arg(long)]
        reject: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_json_file(path)?,
        None => NodeConfig::default(),
    };
    if !cli.bootstrap.is_empty() {
        config.network.bootstrap_nodes = cli.bootstrap;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let session = connect(&config.network).await?;
    println!("📡 Connected to P2P network!");

    match cli.command {
        Commands::Send { from, to, data } => {
            println!("⏳ Waiting for peer connections...");
            let peers = wait_for_peers(&session.overlay, None).await?;
            println!("✅ Connected to {} peer(s)", peers);
            tokio::time::sleep(GOSSIP_SETTLE).await;

            match publish(&session.overlay, FinalMessage { from, to, data }).await {
                Ok(payload) => {
                    println!("📨 Successfully sent data: {}", String::from_utf8_lossy(&payload));
                    tokio::time::sleep(GOSSIP_SETTLE).await;
                }
                Err(e) => {
                    eprintln!("❌ Failed to send message: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Receive { id } => {
            let listener = listen(session, &id).await?;
            println!("📥 Listening for messages to {}", id);

            let count = listener
                .run(shutdown_on_ctrl_c(), |message| {
                    println!("📥 Received data: {}", message.data);
                })
                .await;
            println!("Received {} message(s)", count);
        }

        Commands::Request { from, to, data } => {
            wait_for_peers(&session.overlay, None).await?;
            tokio::time::sleep(GOSSIP_SETTLE).await;
            publish(&session.overlay, ValidationRequest::new(from, to, data)).await?;
            println!("🔎 Validation request sent");
            tokio::time::sleep(GOSSIP_SETTLE).await;
        }

        Commands::Vote { reject } => {
            wait_for_peers(&session.overlay, None).await?;
            tokio::time::sleep(GOSSIP_SETTLE).await;
            let vote = if reject { Vote::reject() } else { Vote::approve() };
            publish(&session.overlay, vote).await?;
            println!("🗳️ Vote sent: {}", if vote.valid { "valid" } else { "invalid" });
            tokio::time::sleep(GOSSIP_SETTLE).await;
        }
    }

    Ok(())
}

fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = tx.send(true);
    });
    rx
}
