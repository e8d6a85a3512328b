//! Quorumcast Node Binary

use clap::{Parser, Subcommand};
use quorumcast_core::{NodeConfig, DEFAULT_BOOTSTRAP_LISTEN_ADDR};
use quorumcast_node::{BootstrapNode, BootstrapOptions, Simulation};
use quorumcast_p2p::{Libp2pConnector, MemoryHub, OverlayConnector, ValidationRequest};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quorumcast-node")]
#[command(about = "Quorumcast - leader-elected quorum validation relay")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the well-known bootstrap peer
    Bootstrap {
        /// P2P listen address
        #[arg(long, default_value = DEFAULT_BOOTSTRAP_LISTEN_ADDR)]
        listen: String,

        /// Identity file, created on first run
        #[arg(long, default_value = "./data/bootstrap_key.json")]
        key_file: PathBuf,
    },

    /// Start the simulated nodes, elect a leader and validate requests
    Simulate {
        /// Node ids, comma separated
        #[arg(long, value_delimiter = ',')]
        roles: Option<Vec<String>>,

        /// Every ready node votes valid on each request
        #[arg(long)]
        auto_vote: bool,

        /// Use an in-process overlay instead of libp2p
        #[arg(long)]
        in_memory: bool,

        /// Bootstrap peer address (repeatable)
        #[arg(long)]
        bootstrap: Vec<String>,

        /// Publish one sample request once the leader is up
        #[arg(long)]
        demo: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_json_file(path)?,
        None => NodeConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    init_logging(&config.log_level);

    match cli.command {
        Commands::Bootstrap { listen, key_file } => {
            let node = BootstrapNode::start(BootstrapOptions {
                listen_addr: listen,
                key_file,
                network: config.network,
            })
            .await?;

            println!("Bootstrap node started with ID: {}", node.peer_id());
            println!("Listening on:");
            for addr in node.dial_addrs() {
                println!("{}", addr);
            }

            node.run(shutdown_on_ctrl_c()).await?;
        }

        Commands::Simulate {
            roles,
            auto_vote,
            in_memory,
            bootstrap,
            demo,
        } => {
            if let Some(roles) = roles {
                config.simulation.roles = roles;
            }
            if auto_vote {
                config.simulation.auto_vote = true;
            }
            if !bootstrap.is_empty() {
                config.network.bootstrap_nodes = bootstrap;
            }
            config.validate()?;

            let connector: Arc<dyn OverlayConnector> = if in_memory {
                info!("Running simulation over the in-memory overlay");
                Arc::new(MemoryHub::new().connector())
            } else {
                Arc::new(Libp2pConnector::new(config.network.clone()))
            };

            let mut simulation = Simulation::new(config.simulation.clone(), connector);
            if demo {
                let roles = &config.simulation.roles;
                let from = roles.first().cloned().unwrap_or_default();
                let to = roles.last().cloned().unwrap_or_default();
                let data = format!("Hello from {}!", from);
                simulation = simulation.with_demo_request(ValidationRequest::new(from, to, data));
            }

            simulation.run(shutdown_on_ctrl_c()).await?;
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
        }
        let _ = tx.send(true);
    });
    rx
}
